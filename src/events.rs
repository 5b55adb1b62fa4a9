//! Domain events, emitted after a fulfillment transaction commits.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    OrderFulfilled {
        order_id: Uuid,
        customer_id: Uuid,
        total: Decimal,
        currency: String,
        payment_session_id: String,
    },
    OrderItemAdded {
        order_id: Uuid,
        product_id: Uuid,
        quantity: u32,
    },
}

impl DomainEvent {
    fn subject(&self) -> &'static str {
        match self {
            DomainEvent::OrderFulfilled { .. } => "orders.fulfilled",
            DomainEvent::OrderItemAdded { .. } => "orders.item_added",
        }
    }
}

/// Confirmation sink: always logs, publishes to NATS when configured.
/// Publish failures are logged and swallowed; the order is already committed
/// by the time an event goes out.
#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self {
        Self { nats }
    }

    pub async fn publish(&self, event: &DomainEvent) {
        tracing::info!(event = ?event, "domain event");
        let Some(client) = &self.nats else { return };
        match serde_json::to_vec(event) {
            Ok(payload) => {
                if let Err(err) = client.publish(event.subject().to_string(), payload.into()).await {
                    tracing::warn!(%err, "event publish failed");
                }
            }
            Err(err) => tracing::warn!(%err, "event serialization failed"),
        }
    }
}
