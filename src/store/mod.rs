//! Storage seam.
//!
//! A [`Store`] hands out transactional [`StoreSession`]s: every session is a
//! unit of work that either commits as a whole or leaves no trace. Multi-step
//! write sequences (webhook fulfillment, direct item add) run entirely inside
//! one session. Two adapters exist: Postgres for production and an in-memory
//! store for tests and database-less development runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{CartEntry, Category, Money, Order, OrderItem, Product, Review, User};
use crate::error::Result;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    /// Begin a new transactional session.
    async fn begin(&self) -> Result<Box<dyn StoreSession>>;
}

/// One transaction against the record store.
///
/// Dropping a session without calling [`StoreSession::commit`] discards all
/// of its writes, so early returns via `?` roll back implicitly.
#[async_trait]
pub trait StoreSession: Send {
    // -- users ------------------------------------------------------------
    async fn insert_user(&mut self, user: &User) -> Result<()>;
    async fn get_user(&mut self, id: Uuid) -> Result<Option<User>>;

    // -- categories -------------------------------------------------------
    async fn insert_category(&mut self, category: &Category) -> Result<()>;
    async fn list_categories(&mut self) -> Result<Vec<Category>>;
    async fn get_category(&mut self, id: Uuid) -> Result<Option<Category>>;
    /// Number of products referencing the category. Deletion is blocked
    /// while this is non-zero.
    async fn count_products_in_category(&mut self, id: Uuid) -> Result<u64>;
    async fn delete_category(&mut self, id: Uuid) -> Result<bool>;

    // -- products ---------------------------------------------------------
    async fn insert_product(&mut self, product: &Product) -> Result<()>;
    async fn get_product(&mut self, id: Uuid) -> Result<Option<Product>>;
    async fn list_products(&mut self, category: Option<Uuid>) -> Result<Vec<Product>>;
    async fn update_product(&mut self, product: &Product) -> Result<bool>;
    async fn soft_delete_product(&mut self, id: Uuid) -> Result<bool>;
    /// Guarded decrement: subtracts `quantity` only while stock stays
    /// non-negative. Returns `false` when stock is insufficient, leaving the
    /// row untouched.
    async fn decrement_stock(&mut self, product_id: Uuid, quantity: u32) -> Result<bool>;

    // -- reviews ----------------------------------------------------------
    async fn insert_review(&mut self, review: &Review) -> Result<()>;
    async fn list_reviews(&mut self, product_id: Uuid) -> Result<Vec<Review>>;

    // -- cart -------------------------------------------------------------
    /// Insert the entry, or add its quantity to the existing (user, product)
    /// row. Atomic with respect to concurrent upserts of the same pair.
    async fn upsert_cart_entry(&mut self, entry: &CartEntry) -> Result<CartEntry>;
    async fn remove_cart_entry(&mut self, user_id: Uuid, product_id: Uuid) -> Result<bool>;
    async fn list_cart(&mut self, user_id: Uuid) -> Result<Vec<CartEntry>>;
    async fn clear_cart(&mut self, user_id: Uuid) -> Result<()>;

    // -- orders -----------------------------------------------------------
    /// Insert an order. A duplicate `payment_session_id` yields
    /// [`crate::error::Error::DuplicateFulfillment`].
    async fn insert_order(&mut self, order: &Order) -> Result<()>;
    async fn get_order(&mut self, id: Uuid) -> Result<Option<Order>>;
    async fn find_order_by_session(&mut self, session_id: &str) -> Result<Option<Order>>;
    async fn list_orders(&mut self, customer_id: Uuid) -> Result<Vec<Order>>;
    async fn set_order_total(&mut self, order_id: Uuid, total: &Money) -> Result<()>;
    async fn delete_order(&mut self, id: Uuid) -> Result<bool>;

    async fn insert_order_item(&mut self, item: &OrderItem) -> Result<()>;
    async fn find_order_item(&mut self, order_id: Uuid, product_id: Uuid)
        -> Result<Option<OrderItem>>;
    async fn set_order_item_quantity(&mut self, item_id: Uuid, quantity: u32) -> Result<()>;
    async fn list_order_items(&mut self, order_id: Uuid) -> Result<Vec<OrderItem>>;

    // -- lifecycle --------------------------------------------------------
    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}
