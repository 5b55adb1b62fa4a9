#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use storefront::checkout::{CheckoutService, CheckoutSettings};
use storefront::domain::{Money, Product, User};
use storefront::events::EventPublisher;
use storefront::payment::{HostedSession, PaymentProvider, ProviderError, SessionRequest};
use storefront::store::{MemoryStore, Store};

pub const WEBHOOK_SECRET: &str = "whsec_test123secret456";

pub fn settings() -> CheckoutSettings {
    CheckoutSettings {
        currency: "USD".to_string(),
        success_url: "http://localhost/success".to_string(),
        cancel_url: "http://localhost/cancel".to_string(),
        webhook_secret: WEBHOOK_SECRET.to_string(),
        provider_timeout: Duration::from_secs(5),
    }
}

/// Provider double that records every request and returns a canned session.
#[derive(Default)]
pub struct RecordingProvider {
    pub calls: AtomicUsize,
}

impl RecordingProvider {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProvider for RecordingProvider {
    async fn create_hosted_session(
        &self,
        _request: SessionRequest,
    ) -> Result<HostedSession, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(HostedSession {
            id: format!("cs_test_{n:04}"),
            url: "https://pay.example/session".to_string(),
        })
    }
}

/// Provider double that hangs long enough to trip the checkout timeout.
pub struct SlowProvider {
    pub delay: Duration,
}

#[async_trait]
impl PaymentProvider for SlowProvider {
    async fn create_hosted_session(
        &self,
        _request: SessionRequest,
    ) -> Result<HostedSession, ProviderError> {
        tokio::time::sleep(self.delay).await;
        Ok(HostedSession { id: "cs_slow".to_string(), url: "https://pay.example".to_string() })
    }
}

pub fn memory_store() -> Arc<dyn Store> {
    Arc::new(MemoryStore::new())
}

pub fn service(store: Arc<dyn Store>, provider: Arc<dyn PaymentProvider>) -> CheckoutService {
    CheckoutService::new(store, provider, EventPublisher::new(None), settings())
}

pub fn service_with_timeout(
    store: Arc<dyn Store>,
    provider: Arc<dyn PaymentProvider>,
    provider_timeout: Duration,
) -> CheckoutService {
    let settings = CheckoutSettings { provider_timeout, ..settings() };
    CheckoutService::new(store, provider, EventPublisher::new(None), settings)
}

pub async fn seed_user(store: &Arc<dyn Store>, username: &str) -> User {
    let user = User::new(username, format!("{username}+{}@example.com", Uuid::now_v7()));
    let mut session = store.begin().await.unwrap();
    session.insert_user(&user).await.unwrap();
    session.commit().await.unwrap();
    user
}

pub async fn seed_product(
    store: &Arc<dyn Store>,
    name: &str,
    price_cents: i64,
    stock: u32,
) -> Product {
    let product = Product::new(name, Money::usd(Decimal::new(price_cents, 2)), stock);
    let mut session = store.begin().await.unwrap();
    session.insert_product(&product).await.unwrap();
    session.commit().await.unwrap();
    product
}

pub async fn product_stock(store: &Arc<dyn Store>, product_id: Uuid) -> u32 {
    let mut session = store.begin().await.unwrap();
    let product = session.get_product(product_id).await.unwrap().unwrap();
    session.rollback().await.unwrap();
    product.stock
}

pub async fn cart_len(store: &Arc<dyn Store>, user_id: Uuid) -> usize {
    let mut session = store.begin().await.unwrap();
    let entries = session.list_cart(user_id).await.unwrap();
    session.rollback().await.unwrap();
    entries.len()
}

pub async fn order_count(store: &Arc<dyn Store>, user_id: Uuid) -> usize {
    let mut session = store.begin().await.unwrap();
    let orders = session.list_orders(user_id).await.unwrap();
    session.rollback().await.unwrap();
    orders.len()
}

/// Webhook payload the provider would send for a completed checkout session.
pub fn checkout_completed_payload(session_id: &str, user_id: Uuid) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": session_id,
                "metadata": { "user_id": user_id.to_string() }
            }
        }
    }))
    .unwrap()
}

pub fn session_object(
    session_id: &str,
    user_id: Uuid,
) -> storefront::checkout::CheckoutSessionObject {
    let mut metadata = HashMap::new();
    metadata.insert("user_id".to_string(), user_id.to_string());
    storefront::checkout::CheckoutSessionObject { id: session_id.to_string(), metadata }
}
