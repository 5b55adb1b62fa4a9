//! Checkout orchestration.
//!
//! Cart mutations, hosted-session creation, and webhook-driven fulfillment.
//! Fulfillment and the direct item-add path run each of their multi-record
//! write sequences inside a single store session: commit on success,
//! rollback on every error path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use crate::domain::{CartEntry, CartLine, CartView, Money, Order, OrderItem};
use crate::error::{Error, Result};
use crate::events::{DomainEvent, EventPublisher};
use crate::payment::{signature, HostedSession, PaymentProvider, SessionLineItem, SessionRequest};
use crate::store::{Store, StoreSession};

/// The only webhook event type that triggers fulfillment.
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

const METADATA_USER_ID: &str = "user_id";

/// Checkout settings, read once at startup and immutable afterwards.
#[derive(Clone, Debug)]
pub struct CheckoutSettings {
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub webhook_secret: String,
    pub provider_timeout: Duration,
}

/// Provider event envelope carried by a webhook delivery.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: CheckoutSessionObject,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Outcome of one webhook delivery.
#[derive(Debug)]
pub enum FulfillmentOutcome {
    /// A new order was created and committed.
    Fulfilled(Order),
    /// An order for this payment session already exists; no side effects.
    AlreadyProcessed,
    /// Event type we do not handle; acknowledged and dropped.
    Ignored,
}

pub struct CheckoutService {
    store: Arc<dyn Store>,
    payments: Arc<dyn PaymentProvider>,
    events: EventPublisher,
    settings: CheckoutSettings,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn Store>,
        payments: Arc<dyn PaymentProvider>,
        events: EventPublisher,
        settings: CheckoutSettings,
    ) -> Self {
        Self { store, payments, events, settings }
    }

    // -- cart -------------------------------------------------------------

    /// Add a product to the cart, merging into the existing (user, product)
    /// entry when one exists. No stock check happens here; stock is
    /// validated at checkout and again at fulfillment.
    pub async fn add_to_cart(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: u32,
    ) -> Result<CartEntry> {
        let mut session = self.store.begin().await?;
        let result = async {
            let product = session
                .get_product(product_id)
                .await?
                .filter(|p| p.is_active)
                .ok_or(Error::NotFound("product"))?;
            session
                .upsert_cart_entry(&CartEntry::new(user_id, product.id, quantity))
                .await
        }
        .await;
        match result {
            Ok(entry) => {
                session.commit().await?;
                Ok(entry)
            }
            Err(err) => {
                session.rollback().await?;
                Err(err)
            }
        }
    }

    pub async fn remove_from_cart(&self, user_id: Uuid, product_id: Uuid) -> Result<()> {
        let mut session = self.store.begin().await?;
        if session.remove_cart_entry(user_id, product_id).await? {
            session.commit().await
        } else {
            session.rollback().await?;
            Err(Error::NotFound("cart entry"))
        }
    }

    /// Cart contents priced at live product prices.
    pub async fn cart_view(&self, user_id: Uuid) -> Result<CartView> {
        let mut session = self.store.begin().await?;
        let result = Self::cart_lines(&mut *session, user_id).await;
        session.rollback().await?;
        Ok(CartView::new(result?, &self.settings.currency))
    }

    async fn cart_lines(session: &mut dyn StoreSession, user_id: Uuid) -> Result<Vec<CartLine>> {
        let entries = session.list_cart(user_id).await?;
        let mut lines = Vec::with_capacity(entries.len());
        for entry in &entries {
            let product = session
                .get_product(entry.product_id)
                .await?
                .ok_or(Error::NotFound("product"))?;
            lines.push(CartLine::from_entry(entry, &product));
        }
        Ok(lines)
    }

    // -- checkout ---------------------------------------------------------

    /// Validate the cart and request a hosted payment session.
    ///
    /// No local state changes: stock is not reserved and the cart stays
    /// intact until the payment webhook confirms the session.
    pub async fn initiate_checkout(&self, user_id: Uuid) -> Result<HostedSession> {
        let mut session = self.store.begin().await?;
        let line_items = Self::build_line_items(&mut *session, user_id).await;
        // Reads only; release the session before calling out.
        session.rollback().await?;
        let line_items = line_items?;

        let mut metadata = HashMap::new();
        metadata.insert(METADATA_USER_ID.to_string(), user_id.to_string());
        let request = SessionRequest {
            line_items,
            currency: self.settings.currency.clone(),
            success_url: self.settings.success_url.clone(),
            cancel_url: self.settings.cancel_url.clone(),
            metadata,
        };

        match tokio::time::timeout(
            self.settings.provider_timeout,
            self.payments.create_hosted_session(request),
        )
        .await
        {
            Ok(Ok(hosted)) => {
                tracing::info!(%user_id, session_id = %hosted.id, "checkout session created");
                Ok(hosted)
            }
            Ok(Err(err)) => Err(Error::PaymentProvider(err.to_string())),
            Err(_) => Err(Error::PaymentProvider("provider call timed out".into())),
        }
    }

    async fn build_line_items(
        session: &mut dyn StoreSession,
        user_id: Uuid,
    ) -> Result<Vec<SessionLineItem>> {
        let entries = session.list_cart(user_id).await?;
        if entries.is_empty() {
            return Err(Error::EmptyCart);
        }
        let mut items = Vec::with_capacity(entries.len());
        for entry in &entries {
            let product = session
                .get_product(entry.product_id)
                .await?
                .filter(|p| p.is_active)
                .ok_or(Error::NotFound("product"))?;
            if product.stock < entry.quantity {
                return Err(Error::InsufficientStock { product: product.name });
            }
            items.push(SessionLineItem {
                name: product.name,
                unit_amount: product.price.minor_units(),
                quantity: entry.quantity,
            });
        }
        Ok(items)
    }

    // -- webhook ----------------------------------------------------------

    /// Verify, parse and process one webhook delivery.
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<FulfillmentOutcome> {
        if !signature::verify(
            &self.settings.webhook_secret,
            payload,
            signature_header,
            signature::DEFAULT_TOLERANCE_SECS,
        ) {
            return Err(Error::InvalidSignature);
        }
        let event: WebhookEvent =
            serde_json::from_slice(payload).map_err(|_| Error::InvalidSignature)?;
        if event.kind != CHECKOUT_COMPLETED {
            tracing::debug!(kind = %event.kind, "ignoring webhook event");
            return Ok(FulfillmentOutcome::Ignored);
        }
        self.fulfill(&event.data.object).await
    }

    /// Convert the user's cart into an order, inside one transaction:
    /// order + items + stock decrements + cart clearing commit together or
    /// not at all. Replays are answered by the payment-session dedup key.
    pub async fn fulfill(&self, object: &CheckoutSessionObject) -> Result<FulfillmentOutcome> {
        let user_id = object
            .metadata
            .get(METADATA_USER_ID)
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .ok_or(Error::NotFound("user"))?;

        let mut session = self.store.begin().await?;
        if session.find_order_by_session(&object.id).await?.is_some() {
            session.rollback().await?;
            tracing::info!(session_id = %object.id, "webhook replay, already fulfilled");
            return Ok(FulfillmentOutcome::AlreadyProcessed);
        }

        let result =
            Self::fulfill_in(&mut *session, user_id, &object.id, &self.settings.currency).await;
        match result {
            Ok(order) => {
                session.commit().await?;
                self.events
                    .publish(&DomainEvent::OrderFulfilled {
                        order_id: order.id,
                        customer_id: order.customer_id,
                        total: order.total_price.amount(),
                        currency: order.total_price.currency().to_string(),
                        payment_session_id: object.id.clone(),
                    })
                    .await;
                Ok(FulfillmentOutcome::Fulfilled(order))
            }
            Err(err) => {
                session.rollback().await?;
                Err(err)
            }
        }
    }

    async fn fulfill_in(
        session: &mut dyn StoreSession,
        user_id: Uuid,
        payment_session_id: &str,
        currency: &str,
    ) -> Result<Order> {
        session.get_user(user_id).await?.ok_or(Error::NotFound("user"))?;

        let entries = session.list_cart(user_id).await?;
        if entries.is_empty() {
            return Err(Error::EmptyCart);
        }

        let mut order = Order::new(user_id, currency, Some(payment_session_id.to_string()));
        session.insert_order(&order).await?;

        let mut total = Money::zero(currency);
        for entry in &entries {
            let product = session
                .get_product(entry.product_id)
                .await?
                .ok_or(Error::NotFound("product"))?;
            if !session.decrement_stock(product.id, entry.quantity).await? {
                return Err(Error::InsufficientStock { product: product.name });
            }
            // Freeze the unit price into the item.
            let item = OrderItem::new(order.id, product.id, entry.quantity, product.price.clone());
            total = total.add(&item.line_total())?;
            session.insert_order_item(&item).await?;
        }

        session.set_order_total(order.id, &total).await?;
        session.clear_cart(user_id).await?;
        order.total_price = total;
        Ok(order)
    }

    // -- orders -----------------------------------------------------------

    /// Create an empty order (order-first path; items arrive via
    /// [`CheckoutService::add_item_to_order`]).
    pub async fn create_order(&self, user_id: Uuid) -> Result<Order> {
        let mut session = self.store.begin().await?;
        session.get_user(user_id).await?.ok_or(Error::NotFound("user"))?;
        let order = Order::new(user_id, &self.settings.currency, None);
        session.insert_order(&order).await?;
        session.commit().await?;
        Ok(order)
    }

    pub async fn list_orders(&self, user_id: Uuid) -> Result<Vec<Order>> {
        let mut session = self.store.begin().await?;
        let orders = session.list_orders(user_id).await;
        session.rollback().await?;
        orders
    }

    /// Fetch an order with its items. Orders owned by other customers are
    /// reported as absent.
    pub async fn get_order(&self, user_id: Uuid, order_id: Uuid) -> Result<(Order, Vec<OrderItem>)> {
        let mut session = self.store.begin().await?;
        let result = async {
            let order = session
                .get_order(order_id)
                .await?
                .filter(|o| o.customer_id == user_id)
                .ok_or(Error::NotFound("order"))?;
            let items = session.list_order_items(order.id).await?;
            Ok((order, items))
        }
        .await;
        session.rollback().await?;
        result
    }

    pub async fn delete_order(&self, user_id: Uuid, order_id: Uuid) -> Result<()> {
        let mut session = self.store.begin().await?;
        let owned = session
            .get_order(order_id)
            .await?
            .map(|o| o.customer_id == user_id)
            .unwrap_or(false);
        if !owned {
            session.rollback().await?;
            return Err(Error::NotFound("order"));
        }
        session.delete_order(order_id).await?;
        session.commit().await
    }

    /// Append a product to an existing order, under the same stock-guard and
    /// transaction discipline as fulfillment. An existing line for the
    /// product is incremented and charged at its frozen unit price, so the
    /// order total stays equal to the sum over its items.
    pub async fn add_item_to_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        product_id: Uuid,
        quantity: u32,
    ) -> Result<OrderItem> {
        let mut session = self.store.begin().await?;
        let result =
            Self::add_item_in(&mut *session, user_id, order_id, product_id, quantity).await;
        match result {
            Ok(item) => {
                session.commit().await?;
                self.events
                    .publish(&DomainEvent::OrderItemAdded {
                        order_id,
                        product_id,
                        quantity,
                    })
                    .await;
                Ok(item)
            }
            Err(err) => {
                session.rollback().await?;
                Err(err)
            }
        }
    }

    async fn add_item_in(
        session: &mut dyn StoreSession,
        user_id: Uuid,
        order_id: Uuid,
        product_id: Uuid,
        quantity: u32,
    ) -> Result<OrderItem> {
        let order = session
            .get_order(order_id)
            .await?
            .filter(|o| o.customer_id == user_id)
            .ok_or(Error::NotFound("order"))?;
        let product = session
            .get_product(product_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or(Error::NotFound("product"))?;

        if !session.decrement_stock(product.id, quantity).await? {
            return Err(Error::InsufficientStock { product: product.name });
        }

        let (item, charged) = match session.find_order_item(order.id, product.id).await? {
            Some(mut existing) => {
                existing.quantity += quantity;
                session
                    .set_order_item_quantity(existing.id, existing.quantity)
                    .await?;
                let charged = existing.unit_price.multiply(quantity);
                (existing, charged)
            }
            None => {
                let item = OrderItem::new(order.id, product.id, quantity, product.price.clone());
                session.insert_order_item(&item).await?;
                let charged = item.line_total();
                (item, charged)
            }
        };

        let new_total = order.total_price.add(&charged)?;
        session.set_order_total(order.id, &new_total).await?;
        Ok(item)
    }
}
