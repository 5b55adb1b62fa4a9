//! Cart records and views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::catalog::Product;
use super::value_objects::Money;

/// One (user, product) row of a cart. The pair is unique: adding a product
/// that is already present increments the quantity instead of inserting a
/// second row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CartEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
}

impl CartEntry {
    pub fn new(user_id: Uuid, product_id: Uuid, quantity: u32) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            product_id,
            quantity,
            created_at: Utc::now(),
        }
    }
}

/// A cart entry joined with its product, priced at the product's live price.
#[derive(Clone, Debug, Serialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

impl CartLine {
    pub fn from_entry(entry: &CartEntry, product: &Product) -> Self {
        Self {
            product_id: product.id,
            product_name: product.name.clone(),
            quantity: entry.quantity,
            unit_price: product.price.clone(),
            line_total: product.price.multiply(entry.quantity),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLine>,
    pub subtotal: Money,
}

impl CartView {
    pub fn new(lines: Vec<CartLine>, currency: &str) -> Self {
        let subtotal = lines.iter().fold(Money::zero(currency), |acc, line| {
            acc.add(&line.line_total).unwrap_or(acc)
        });
        Self { lines, subtotal }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_cart_view_subtotal() {
        let a = Product::new("A", Money::usd(Decimal::new(1000, 2)), 10);
        let b = Product::new("B", Money::usd(Decimal::new(500, 2)), 10);
        let lines = vec![
            CartLine::from_entry(&CartEntry::new(Uuid::now_v7(), a.id, 2), &a),
            CartLine::from_entry(&CartEntry::new(Uuid::now_v7(), b.id, 1), &b),
        ];
        let view = CartView::new(lines, "USD");
        assert_eq!(view.subtotal.amount(), Decimal::new(2500, 2));
    }
}
