//! Catalog records: categories, products, reviews.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value_objects::Money;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: String,
}

impl Category {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self { id: Uuid::now_v7(), name: name.into(), description: description.into() }
    }
}

/// A catalog product. Stock is a plain non-negative count; the catalog never
/// enforces stock on its own — checkout and fulfillment own that invariant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock: u32,
    pub is_active: bool,
    pub category_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(name: impl Into<String>, price: Money, stock: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            description: String::new(),
            price,
            stock,
            is_active: true,
            category_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// One review per (user, product); rating 1-5.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn new(user_id: Uuid, product_id: Uuid, rating: u8, comment: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            product_id,
            rating,
            comment: comment.into(),
            created_at: Utc::now(),
        }
    }
}

/// Average rating over a set of reviews, 0.0 when there are none.
pub fn average_rating(reviews: &[Review]) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    let sum: u32 = reviews.iter().map(|r| u32::from(r.rating)).sum();
    f64::from(sum) / reviews.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_average_rating() {
        let product = Product::new("Widget", Money::usd(Decimal::new(10, 0)), 5);
        let reviews = vec![
            Review::new(Uuid::now_v7(), product.id, 4, ""),
            Review::new(Uuid::now_v7(), product.id, 5, "great"),
        ];
        assert_eq!(average_rating(&reviews), 4.5);
        assert_eq!(average_rating(&[]), 0.0);
    }
}
