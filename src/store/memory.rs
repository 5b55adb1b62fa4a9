//! In-memory store adapter, for tests and database-less development runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::{CartEntry, Category, Money, Order, OrderItem, Product, Review, User};
use crate::error::{Error, Result};

use super::{Store, StoreSession};

#[derive(Clone, Default)]
struct ShopState {
    users: HashMap<Uuid, User>,
    categories: HashMap<Uuid, Category>,
    products: HashMap<Uuid, Product>,
    reviews: Vec<Review>,
    cart: BTreeMap<(Uuid, Uuid), CartEntry>,
    orders: HashMap<Uuid, Order>,
    order_items: Vec<OrderItem>,
}

/// Whole-state store behind one async mutex.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<ShopState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreSession>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemorySession { guard, working }))
    }
}

/// A session holds the store lock for its whole lifetime, so sessions are
/// serialized. Mutations land on a working copy; commit swaps the copy in,
/// dropping without commit discards it.
pub struct MemorySession {
    guard: OwnedMutexGuard<ShopState>,
    working: ShopState,
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn insert_user(&mut self, user: &User) -> Result<()> {
        if self.working.users.values().any(|u| u.email == user.email) {
            return Err(Error::Conflict("email already registered".into()));
        }
        self.working.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&mut self, id: Uuid) -> Result<Option<User>> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn insert_category(&mut self, category: &Category) -> Result<()> {
        if self.working.categories.values().any(|c| c.name == category.name) {
            return Err(Error::Conflict("category name already in use".into()));
        }
        self.working.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn list_categories(&mut self) -> Result<Vec<Category>> {
        let mut categories: Vec<_> = self.working.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn get_category(&mut self, id: Uuid) -> Result<Option<Category>> {
        Ok(self.working.categories.get(&id).cloned())
    }

    async fn count_products_in_category(&mut self, id: Uuid) -> Result<u64> {
        let count = self
            .working
            .products
            .values()
            .filter(|p| p.category_id == Some(id))
            .count();
        Ok(count as u64)
    }

    async fn delete_category(&mut self, id: Uuid) -> Result<bool> {
        Ok(self.working.categories.remove(&id).is_some())
    }

    async fn insert_product(&mut self, product: &Product) -> Result<()> {
        self.working.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&mut self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn list_products(&mut self, category: Option<Uuid>) -> Result<Vec<Product>> {
        let mut products: Vec<_> = self
            .working
            .products
            .values()
            .filter(|p| p.is_active)
            .filter(|p| category.is_none() || p.category_id == category)
            .cloned()
            .collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(products)
    }

    async fn update_product(&mut self, product: &Product) -> Result<bool> {
        match self.working.products.get_mut(&product.id) {
            Some(existing) => {
                *existing = product.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn soft_delete_product(&mut self, id: Uuid) -> Result<bool> {
        match self.working.products.get_mut(&id) {
            Some(product) => {
                product.is_active = false;
                product.touch();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn decrement_stock(&mut self, product_id: Uuid, quantity: u32) -> Result<bool> {
        let Some(product) = self.working.products.get_mut(&product_id) else {
            return Ok(false);
        };
        if product.stock < quantity {
            return Ok(false);
        }
        product.stock -= quantity;
        product.touch();
        Ok(true)
    }

    async fn insert_review(&mut self, review: &Review) -> Result<()> {
        let duplicate = self
            .working
            .reviews
            .iter()
            .any(|r| r.user_id == review.user_id && r.product_id == review.product_id);
        if duplicate {
            return Err(Error::Conflict("product already reviewed by this user".into()));
        }
        self.working.reviews.push(review.clone());
        Ok(())
    }

    async fn list_reviews(&mut self, product_id: Uuid) -> Result<Vec<Review>> {
        Ok(self
            .working
            .reviews
            .iter()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn upsert_cart_entry(&mut self, entry: &CartEntry) -> Result<CartEntry> {
        let key = (entry.user_id, entry.product_id);
        let merged = self
            .working
            .cart
            .entry(key)
            .and_modify(|existing| existing.quantity += entry.quantity)
            .or_insert_with(|| entry.clone());
        Ok(merged.clone())
    }

    async fn remove_cart_entry(&mut self, user_id: Uuid, product_id: Uuid) -> Result<bool> {
        Ok(self.working.cart.remove(&(user_id, product_id)).is_some())
    }

    async fn list_cart(&mut self, user_id: Uuid) -> Result<Vec<CartEntry>> {
        Ok(self
            .working
            .cart
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn clear_cart(&mut self, user_id: Uuid) -> Result<()> {
        self.working.cart.retain(|(user, _), _| *user != user_id);
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        if let Some(session_id) = &order.payment_session_id {
            let taken = self
                .working
                .orders
                .values()
                .any(|o| o.payment_session_id.as_deref() == Some(session_id));
            if taken {
                return Err(Error::DuplicateFulfillment);
            }
        }
        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&mut self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn find_order_by_session(&mut self, session_id: &str) -> Result<Option<Order>> {
        Ok(self
            .working
            .orders
            .values()
            .find(|o| o.payment_session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn list_orders(&mut self, customer_id: Uuid) -> Result<Vec<Order>> {
        let mut orders: Vec<_> = self
            .working
            .orders
            .values()
            .filter(|o| o.customer_id == customer_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn set_order_total(&mut self, order_id: Uuid, total: &Money) -> Result<()> {
        if let Some(order) = self.working.orders.get_mut(&order_id) {
            order.total_price = total.clone();
        }
        Ok(())
    }

    async fn delete_order(&mut self, id: Uuid) -> Result<bool> {
        let removed = self.working.orders.remove(&id).is_some();
        if removed {
            self.working.order_items.retain(|item| item.order_id != id);
        }
        Ok(removed)
    }

    async fn insert_order_item(&mut self, item: &OrderItem) -> Result<()> {
        self.working.order_items.push(item.clone());
        Ok(())
    }

    async fn find_order_item(
        &mut self,
        order_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<OrderItem>> {
        Ok(self
            .working
            .order_items
            .iter()
            .find(|i| i.order_id == order_id && i.product_id == product_id)
            .cloned())
    }

    async fn set_order_item_quantity(&mut self, item_id: Uuid, quantity: u32) -> Result<()> {
        if let Some(item) = self.working.order_items.iter_mut().find(|i| i.id == item_id) {
            item.quantity = quantity;
        }
        Ok(())
    }

    async fn list_order_items(&mut self, order_id: Uuid) -> Result<Vec<OrderItem>> {
        Ok(self
            .working
            .order_items
            .iter()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemorySession { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        drop(self);
        Ok(())
    }
}
