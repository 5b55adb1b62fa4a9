//! Postgres store adapter. One sqlx transaction per session.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::domain::{CartEntry, Category, Money, Order, OrderItem, Product, Review, User};
use crate::error::{Error, Result};

use super::{Store, StoreSession};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreSession>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgSession { tx }))
    }
}

pub struct PgSession {
    tx: Transaction<'static, Postgres>,
}

fn map_db_err(err: sqlx::Error) -> Error {
    if let sqlx::Error::Database(ref de) = err {
        if de.code().as_deref() == Some("23505") {
            return match de.constraint() {
                Some("orders_payment_session_id_key") => Error::DuplicateFulfillment,
                Some("reviews_user_id_product_id_key") => {
                    Error::Conflict("product already reviewed by this user".into())
                }
                Some("categories_name_key") => {
                    Error::Conflict("category name already in use".into())
                }
                Some("users_email_key") => Error::Conflict("email already registered".into()),
                _ => Error::Conflict("unique constraint violated".into()),
            };
        }
        if de.code().as_deref() == Some("23503") {
            return Error::Conflict("record is referenced by other records".into());
        }
    }
    Error::Storage(err)
}

fn money_from(row: &PgRow, amount_col: &str) -> Money {
    Money::new(row.get::<Decimal, _>(amount_col), &row.get::<String, _>("currency"))
}

fn user_from(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        google_id: row.get("google_id"),
        picture: row.get("picture"),
        created_at: row.get("created_at"),
    }
}

fn category_from(row: &PgRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
    }
}

fn product_from(row: &PgRow) -> Product {
    Product {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        price: money_from(row, "price"),
        stock: row.get::<i32, _>("stock").max(0) as u32,
        is_active: row.get("is_active"),
        category_id: row.get("category_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn review_from(row: &PgRow) -> Review {
    Review {
        id: row.get("id"),
        user_id: row.get("user_id"),
        product_id: row.get("product_id"),
        rating: row.get::<i16, _>("rating").clamp(1, 5) as u8,
        comment: row.get("comment"),
        created_at: row.get("created_at"),
    }
}

fn cart_entry_from(row: &PgRow) -> CartEntry {
    CartEntry {
        id: row.get("id"),
        user_id: row.get("user_id"),
        product_id: row.get("product_id"),
        quantity: row.get::<i32, _>("quantity").max(0) as u32,
        created_at: row.get("created_at"),
    }
}

fn order_from(row: &PgRow) -> Order {
    Order {
        id: row.get("id"),
        order_number: row.get("order_number"),
        customer_id: row.get("customer_id"),
        total_price: money_from(row, "total_price"),
        payment_session_id: row.get("payment_session_id"),
        created_at: row.get("created_at"),
    }
}

fn order_item_from(row: &PgRow) -> OrderItem {
    OrderItem {
        id: row.get("id"),
        order_id: row.get("order_id"),
        product_id: row.get("product_id"),
        quantity: row.get::<i32, _>("quantity").max(0) as u32,
        unit_price: money_from(row, "unit_price"),
    }
}

#[async_trait]
impl StoreSession for PgSession {
    async fn insert_user(&mut self, user: &User) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, username, email, google_id, picture, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.google_id)
        .bind(&user.picture)
        .bind(user.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn get_user(&mut self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(user_from))
    }

    async fn insert_category(&mut self, category: &Category) -> Result<()> {
        sqlx::query("INSERT INTO categories (id, name, description) VALUES ($1, $2, $3)")
            .bind(category.id)
            .bind(&category.name)
            .bind(&category.description)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn list_categories(&mut self) -> Result<Vec<Category>> {
        let rows = sqlx::query("SELECT * FROM categories ORDER BY name")
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.iter().map(category_from).collect())
    }

    async fn get_category(&mut self, id: Uuid) -> Result<Option<Category>> {
        let row = sqlx::query("SELECT * FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(category_from))
    }

    async fn count_products_in_category(&mut self, id: Uuid) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM products WHERE category_id = $1")
            .bind(id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(row.get::<i64, _>("count").max(0) as u64)
    }

    async fn delete_category(&mut self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_product(&mut self, product: &Product) -> Result<()> {
        sqlx::query(
            "INSERT INTO products \
             (id, name, description, price, currency, stock, is_active, category_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.amount())
        .bind(product.price.currency())
        .bind(product.stock as i32)
        .bind(product.is_active)
        .bind(product.category_id)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn get_product(&mut self, id: Uuid) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(product_from))
    }

    async fn list_products(&mut self, category: Option<Uuid>) -> Result<Vec<Product>> {
        let rows = match category {
            Some(category_id) => {
                sqlx::query(
                    "SELECT * FROM products WHERE is_active AND category_id = $1 \
                     ORDER BY created_at DESC",
                )
                .bind(category_id)
                .fetch_all(&mut *self.tx)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM products WHERE is_active ORDER BY created_at DESC")
                    .fetch_all(&mut *self.tx)
                    .await?
            }
        };
        Ok(rows.iter().map(product_from).collect())
    }

    async fn update_product(&mut self, product: &Product) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE products SET name = $2, description = $3, price = $4, currency = $5, \
             stock = $6, is_active = $7, category_id = $8, updated_at = NOW() WHERE id = $1",
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.amount())
        .bind(product.price.currency())
        .bind(product.stock as i32)
        .bind(product.is_active)
        .bind(product.category_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn soft_delete_product(&mut self, id: Uuid) -> Result<bool> {
        let result =
            sqlx::query("UPDATE products SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .execute(&mut *self.tx)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn decrement_stock(&mut self, product_id: Uuid, quantity: u32) -> Result<bool> {
        // Guarded arithmetic update; never read-then-write.
        let result = sqlx::query(
            "UPDATE products SET stock = stock - $2, updated_at = NOW() \
             WHERE id = $1 AND stock >= $2",
        )
        .bind(product_id)
        .bind(quantity as i32)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_review(&mut self, review: &Review) -> Result<()> {
        sqlx::query(
            "INSERT INTO reviews (id, user_id, product_id, rating, comment, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(review.id)
        .bind(review.user_id)
        .bind(review.product_id)
        .bind(i16::from(review.rating))
        .bind(&review.comment)
        .bind(review.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn list_reviews(&mut self, product_id: Uuid) -> Result<Vec<Review>> {
        let rows = sqlx::query(
            "SELECT * FROM reviews WHERE product_id = $1 ORDER BY created_at DESC",
        )
        .bind(product_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.iter().map(review_from).collect())
    }

    async fn upsert_cart_entry(&mut self, entry: &CartEntry) -> Result<CartEntry> {
        let row = sqlx::query(
            "INSERT INTO cart_entries (id, user_id, product_id, quantity, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (user_id, product_id) \
             DO UPDATE SET quantity = cart_entries.quantity + EXCLUDED.quantity \
             RETURNING *",
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.product_id)
        .bind(entry.quantity as i32)
        .bind(entry.created_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(cart_entry_from(&row))
    }

    async fn remove_cart_entry(&mut self, user_id: Uuid, product_id: Uuid) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM cart_entries WHERE user_id = $1 AND product_id = $2")
                .bind(user_id)
                .bind(product_id)
                .execute(&mut *self.tx)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_cart(&mut self, user_id: Uuid) -> Result<Vec<CartEntry>> {
        let rows =
            sqlx::query("SELECT * FROM cart_entries WHERE user_id = $1 ORDER BY created_at")
                .bind(user_id)
                .fetch_all(&mut *self.tx)
                .await?;
        Ok(rows.iter().map(cart_entry_from).collect())
    }

    async fn clear_cart(&mut self, user_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM cart_entries WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            "INSERT INTO orders \
             (id, order_number, customer_id, total_price, currency, payment_session_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(order.id)
        .bind(&order.order_number)
        .bind(order.customer_id)
        .bind(order.total_price.amount())
        .bind(order.total_price.currency())
        .bind(&order.payment_session_id)
        .bind(order.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn get_order(&mut self, id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(order_from))
    }

    async fn find_order_by_session(&mut self, session_id: &str) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE payment_session_id = $1")
            .bind(session_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(order_from))
    }

    async fn list_orders(&mut self, customer_id: Uuid) -> Result<Vec<Order>> {
        let rows =
            sqlx::query("SELECT * FROM orders WHERE customer_id = $1 ORDER BY created_at DESC")
                .bind(customer_id)
                .fetch_all(&mut *self.tx)
                .await?;
        Ok(rows.iter().map(order_from).collect())
    }

    async fn set_order_total(&mut self, order_id: Uuid, total: &Money) -> Result<()> {
        sqlx::query("UPDATE orders SET total_price = $2, currency = $3 WHERE id = $1")
            .bind(order_id)
            .bind(total.amount())
            .bind(total.currency())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_order(&mut self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_order_item(&mut self, item: &OrderItem) -> Result<()> {
        sqlx::query(
            "INSERT INTO order_items (id, order_id, product_id, quantity, unit_price, currency) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(item.id)
        .bind(item.order_id)
        .bind(item.product_id)
        .bind(item.quantity as i32)
        .bind(item.unit_price.amount())
        .bind(item.unit_price.currency())
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn find_order_item(
        &mut self,
        order_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<OrderItem>> {
        let row = sqlx::query(
            "SELECT * FROM order_items WHERE order_id = $1 AND product_id = $2",
        )
        .bind(order_id)
        .bind(product_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.as_ref().map(order_item_from))
    }

    async fn set_order_item_quantity(&mut self, item_id: Uuid, quantity: u32) -> Result<()> {
        sqlx::query("UPDATE order_items SET quantity = $2 WHERE id = $1")
            .bind(item_id)
            .bind(quantity as i32)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn list_order_items(&mut self, order_id: Uuid) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query("SELECT * FROM order_items WHERE order_id = $1")
            .bind(order_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.iter().map(order_item_from).collect())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.tx.rollback().await?;
        Ok(())
    }
}
