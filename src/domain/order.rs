//! Order records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value_objects::Money;

/// A finalized purchase owned by one customer. Total price accumulates while
/// items are appended and is otherwise immutable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub total_price: Money,
    /// Hosted-payment session that produced this order. Unique across orders;
    /// `None` for orders created directly (order-first path).
    pub payment_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(customer_id: Uuid, currency: &str, payment_session_id: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            order_number: format!("ORD-{:08}", rand::random::<u32>() % 100_000_000),
            customer_id,
            total_price: Money::zero(currency),
            payment_session_id,
            created_at: Utc::now(),
        }
    }
}

/// One line of an order. `unit_price` is the product price at purchase time,
/// frozen: later catalog price changes never touch historical orders.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderItem {
    pub fn new(order_id: Uuid, product_id: Uuid, quantity: u32, unit_price: Money) -> Self {
        Self { id: Uuid::now_v7(), order_id, product_id, quantity, unit_price }
    }

    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// Recompute an order total from its items. Used by tests and consistency
/// checks; the write paths accumulate incrementally inside a transaction.
pub fn total_of(items: &[OrderItem], currency: &str) -> Money {
    items.iter().fold(Money::zero(currency), |acc, item| {
        acc.add(&item.line_total()).unwrap_or(acc)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_total_of_items() {
        let order = Order::new(Uuid::now_v7(), "USD", None);
        let items = vec![
            OrderItem::new(order.id, Uuid::now_v7(), 2, Money::usd(Decimal::new(1000, 2))),
            OrderItem::new(order.id, Uuid::now_v7(), 1, Money::usd(Decimal::new(500, 2))),
        ];
        assert_eq!(total_of(&items, "USD").amount(), Decimal::new(2500, 2));
    }

    #[test]
    fn test_unit_price_frozen_into_item() {
        let item = OrderItem::new(Uuid::now_v7(), Uuid::now_v7(), 3, Money::usd(Decimal::new(199, 2)));
        assert_eq!(item.line_total().amount(), Decimal::new(597, 2));
    }
}
