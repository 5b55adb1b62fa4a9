//! Cart, checkout and fulfillment behavior against the in-memory store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use uuid::Uuid;

use common::*;
use storefront::checkout::FulfillmentOutcome;
use storefront::domain::order::total_of;
use storefront::domain::Money;
use storefront::Error;

#[tokio::test]
async fn adding_same_product_twice_merges_into_one_entry() {
    let store = memory_store();
    let provider = Arc::new(RecordingProvider::default());
    let svc = service(Arc::clone(&store), provider);
    let user = seed_user(&store, "ada").await;
    let product = seed_product(&store, "Widget", 1000, 10).await;

    svc.add_to_cart(user.id, product.id, 2).await.unwrap();
    svc.add_to_cart(user.id, product.id, 3).await.unwrap();

    let view = svc.cart_view(user.id).await.unwrap();
    assert_eq!(view.lines.len(), 1, "duplicate add must merge, not duplicate");
    assert_eq!(view.lines[0].quantity, 5);
    assert_eq!(view.subtotal.amount(), Decimal::new(5000, 2));
}

#[tokio::test]
async fn cart_lines_are_priced_at_live_product_price() {
    let store = memory_store();
    let provider = Arc::new(RecordingProvider::default());
    let svc = service(Arc::clone(&store), provider);
    let user = seed_user(&store, "ada").await;
    let product = seed_product(&store, "Widget", 1000, 10).await;

    svc.add_to_cart(user.id, product.id, 2).await.unwrap();

    // Catalog price change shows up in the cart view immediately.
    let mut session = store.begin().await.unwrap();
    let mut updated = session.get_product(product.id).await.unwrap().unwrap();
    updated.price = Money::usd(Decimal::new(2500, 2));
    session.update_product(&updated).await.unwrap();
    session.commit().await.unwrap();

    let view = svc.cart_view(user.id).await.unwrap();
    assert_eq!(view.lines[0].line_total.amount(), Decimal::new(5000, 2));
}

#[tokio::test]
async fn removing_missing_cart_entry_is_not_found() {
    let store = memory_store();
    let provider = Arc::new(RecordingProvider::default());
    let svc = service(Arc::clone(&store), provider);
    let user = seed_user(&store, "ada").await;

    let err = svc.remove_from_cart(user.id, Uuid::now_v7()).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn checkout_with_empty_cart_never_reaches_the_provider() {
    let store = memory_store();
    let provider = Arc::new(RecordingProvider::default());
    let svc = service(Arc::clone(&store), Arc::clone(&provider) as _);
    let user = seed_user(&store, "ada").await;

    let err = svc.initiate_checkout(user.id).await.unwrap_err();
    assert!(matches!(err, Error::EmptyCart));
    assert_eq!(provider.call_count(), 0, "no session may be created");
}

#[tokio::test]
async fn checkout_with_insufficient_stock_aborts_whole_checkout() {
    let store = memory_store();
    let provider = Arc::new(RecordingProvider::default());
    let svc = service(Arc::clone(&store), Arc::clone(&provider) as _);
    let user = seed_user(&store, "ada").await;
    let plenty = seed_product(&store, "Widget", 1000, 10).await;
    let scarce = seed_product(&store, "Gadget", 500, 1).await;

    svc.add_to_cart(user.id, plenty.id, 1).await.unwrap();
    svc.add_to_cart(user.id, scarce.id, 2).await.unwrap();

    let err = svc.initiate_checkout(user.id).await.unwrap_err();
    match err {
        Error::InsufficientStock { product } => assert_eq!(product, "Gadget"),
        other => panic!("expected InsufficientStock, got {other:?}"),
    }
    assert_eq!(provider.call_count(), 0);
    // Nothing was reserved or mutated.
    assert_eq!(product_stock(&store, plenty.id).await, 10);
    assert_eq!(product_stock(&store, scarce.id).await, 1);
    assert_eq!(cart_len(&store, user.id).await, 2);
}

#[tokio::test]
async fn checkout_returns_provider_redirect_and_leaves_state_alone() {
    let store = memory_store();
    let provider = Arc::new(RecordingProvider::default());
    let svc = service(Arc::clone(&store), Arc::clone(&provider) as _);
    let user = seed_user(&store, "ada").await;
    let product = seed_product(&store, "Widget", 1000, 10).await;

    svc.add_to_cart(user.id, product.id, 2).await.unwrap();
    let hosted = svc.initiate_checkout(user.id).await.unwrap();

    assert_eq!(hosted.url, "https://pay.example/session");
    assert_eq!(provider.call_count(), 1);
    // Stock is not reserved and the cart survives until the webhook fires.
    assert_eq!(product_stock(&store, product.id).await, 10);
    assert_eq!(cart_len(&store, user.id).await, 1);
}

#[tokio::test]
async fn provider_timeout_maps_to_payment_provider_error() {
    let store = memory_store();
    let provider = Arc::new(SlowProvider { delay: Duration::from_millis(300) });
    let svc = service_with_timeout(Arc::clone(&store), provider, Duration::from_millis(25));
    let user = seed_user(&store, "ada").await;
    let product = seed_product(&store, "Widget", 1000, 10).await;

    svc.add_to_cart(user.id, product.id, 1).await.unwrap();
    let err = svc.initiate_checkout(user.id).await.unwrap_err();
    assert!(matches!(err, Error::PaymentProvider(_)));
}

#[tokio::test]
async fn fulfillment_scenario_totals_stock_and_cart() {
    let store = memory_store();
    let provider = Arc::new(RecordingProvider::default());
    let svc = service(Arc::clone(&store), provider);
    let user = seed_user(&store, "ada").await;
    let product_a = seed_product(&store, "ProductA", 1000, 5).await;
    let product_b = seed_product(&store, "ProductB", 500, 5).await;

    svc.add_to_cart(user.id, product_a.id, 2).await.unwrap();
    svc.add_to_cart(user.id, product_b.id, 1).await.unwrap();

    let outcome = svc.fulfill(&session_object("cs_scenario", user.id)).await.unwrap();
    let order = match outcome {
        FulfillmentOutcome::Fulfilled(order) => order,
        other => panic!("expected fulfillment, got {other:?}"),
    };

    assert_eq!(order.total_price.amount(), Decimal::new(2500, 2));

    let mut session = store.begin().await.unwrap();
    let items = session.list_order_items(order.id).await.unwrap();
    let stored = session.get_order(order.id).await.unwrap().unwrap();
    session.rollback().await.unwrap();

    assert_eq!(items.len(), 2);
    // The money invariant: persisted total equals the sum over the items.
    assert_eq!(stored.total_price, total_of(&items, "USD"));
    assert_eq!(product_stock(&store, product_a.id).await, 3);
    assert_eq!(product_stock(&store, product_b.id).await, 4);
    assert_eq!(cart_len(&store, user.id).await, 0);
}

#[tokio::test]
async fn fulfilled_items_keep_their_frozen_price() {
    let store = memory_store();
    let provider = Arc::new(RecordingProvider::default());
    let svc = service(Arc::clone(&store), provider);
    let user = seed_user(&store, "ada").await;
    let product = seed_product(&store, "Widget", 1999, 5).await;

    svc.add_to_cart(user.id, product.id, 1).await.unwrap();
    let outcome = svc.fulfill(&session_object("cs_frozen", user.id)).await.unwrap();
    let order = match outcome {
        FulfillmentOutcome::Fulfilled(order) => order,
        other => panic!("expected fulfillment, got {other:?}"),
    };

    // Catalog price changes after purchase must not touch the order.
    let mut session = store.begin().await.unwrap();
    let mut updated = session.get_product(product.id).await.unwrap().unwrap();
    updated.price = Money::usd(Decimal::new(9999, 2));
    session.update_product(&updated).await.unwrap();
    session.commit().await.unwrap();

    let mut session = store.begin().await.unwrap();
    let items = session.list_order_items(order.id).await.unwrap();
    session.rollback().await.unwrap();
    assert_eq!(items[0].unit_price.amount(), Decimal::new(1999, 2));
}

#[tokio::test]
async fn replaying_a_webhook_creates_exactly_one_order() {
    let store = memory_store();
    let provider = Arc::new(RecordingProvider::default());
    let svc = service(Arc::clone(&store), provider);
    let user = seed_user(&store, "ada").await;
    let product = seed_product(&store, "Widget", 1000, 5).await;

    svc.add_to_cart(user.id, product.id, 1).await.unwrap();

    let object = session_object("cs_replay", user.id);
    let first = svc.fulfill(&object).await.unwrap();
    assert!(matches!(first, FulfillmentOutcome::Fulfilled(_)));

    let second = svc.fulfill(&object).await.unwrap();
    assert!(matches!(second, FulfillmentOutcome::AlreadyProcessed));

    assert_eq!(order_count(&store, user.id).await, 1);
    assert_eq!(product_stock(&store, product.id).await, 4, "stock decremented once");
}

#[tokio::test]
async fn fulfillment_with_unknown_user_has_no_side_effects() {
    let store = memory_store();
    let provider = Arc::new(RecordingProvider::default());
    let svc = service(Arc::clone(&store), provider);

    let err = svc.fulfill(&session_object("cs_ghost", Uuid::now_v7())).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn mid_fulfillment_stock_violation_rolls_everything_back() {
    let store = memory_store();
    let provider = Arc::new(RecordingProvider::default());
    let svc = service(Arc::clone(&store), provider);
    let user = seed_user(&store, "ada").await;
    let available = seed_product(&store, "Available", 1000, 10).await;
    let depleted = seed_product(&store, "Depleted", 500, 0).await;

    svc.add_to_cart(user.id, available.id, 2).await.unwrap();
    svc.add_to_cart(user.id, depleted.id, 1).await.unwrap();

    let err = svc.fulfill(&session_object("cs_partial", user.id)).await.unwrap_err();
    assert!(matches!(err, Error::InsufficientStock { .. }));

    // The whole transaction rolled back: no order, no decrement, cart kept.
    assert_eq!(order_count(&store, user.id).await, 0);
    assert_eq!(product_stock(&store, available.id).await, 10);
    assert_eq!(cart_len(&store, user.id).await, 2);
}

#[tokio::test]
async fn concurrent_fulfillments_never_oversell_stock() {
    let store = memory_store();
    let provider = Arc::new(RecordingProvider::default());
    let svc = Arc::new(service(Arc::clone(&store), provider));
    let product = seed_product(&store, "Limited", 1000, 3).await;

    let mut handles = Vec::new();
    for i in 0..6 {
        let user = seed_user(&store, &format!("shopper{i}")).await;
        svc.add_to_cart(user.id, product.id, 1).await.unwrap();
        let svc = Arc::clone(&svc);
        handles.push(tokio::spawn(async move {
            svc.fulfill(&session_object(&format!("cs_race_{i}"), user.id)).await
        }));
    }

    let mut fulfilled = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(FulfillmentOutcome::Fulfilled(_)) => fulfilled += 1,
            Err(Error::InsufficientStock { .. }) => rejected += 1,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(fulfilled, 3, "stock of 3 admits exactly 3 single-unit orders");
    assert_eq!(rejected, 3);
    assert_eq!(product_stock(&store, product.id).await, 0);
}

#[tokio::test]
async fn direct_item_add_guards_stock_and_freezes_price() {
    let store = memory_store();
    let provider = Arc::new(RecordingProvider::default());
    let svc = service(Arc::clone(&store), provider);
    let user = seed_user(&store, "ada").await;
    let product = seed_product(&store, "Widget", 1000, 5).await;

    let order = svc.create_order(user.id).await.unwrap();
    let item = svc.add_item_to_order(user.id, order.id, product.id, 2).await.unwrap();
    assert_eq!(item.unit_price.amount(), Decimal::new(1000, 2));
    assert_eq!(product_stock(&store, product.id).await, 3);

    // Raise the catalog price; the existing line keeps charging the frozen one.
    let mut session = store.begin().await.unwrap();
    let mut updated = session.get_product(product.id).await.unwrap().unwrap();
    updated.price = Money::usd(Decimal::new(9900, 2));
    session.update_product(&updated).await.unwrap();
    session.commit().await.unwrap();

    let item = svc.add_item_to_order(user.id, order.id, product.id, 1).await.unwrap();
    assert_eq!(item.quantity, 3);
    assert_eq!(item.unit_price.amount(), Decimal::new(1000, 2));

    let (order, items) = svc.get_order(user.id, order.id).await.unwrap();
    assert_eq!(order.total_price.amount(), Decimal::new(3000, 2));
    assert_eq!(order.total_price, total_of(&items, "USD"));
    assert_eq!(product_stock(&store, product.id).await, 2);

    // And the guard still holds.
    let err = svc.add_item_to_order(user.id, order.id, product.id, 50).await.unwrap_err();
    assert!(matches!(err, Error::InsufficientStock { .. }));
    assert_eq!(product_stock(&store, product.id).await, 2);
}

#[tokio::test]
async fn orders_are_invisible_to_other_customers() {
    let store = memory_store();
    let provider = Arc::new(RecordingProvider::default());
    let svc = service(Arc::clone(&store), provider);
    let ada = seed_user(&store, "ada").await;
    let eve = seed_user(&store, "eve").await;

    let order = svc.create_order(ada.id).await.unwrap();
    let err = svc.get_order(eve.id, order.id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    let err = svc.delete_order(eve.id, order.id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(order_count(&store, ada.id).await, 1);
}
