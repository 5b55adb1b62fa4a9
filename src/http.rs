//! REST surface.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;
use validator::Validate;

use crate::checkout::{CheckoutService, FulfillmentOutcome};
use crate::domain::catalog::average_rating;
use crate::domain::{CartEntry, CartView, Category, Money, Order, OrderItem, Product, Review, User};
use crate::error::{Error, Result};
use crate::store::Store;

pub const SIGNATURE_HEADER: &str = "x-payment-signature";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub checkout: Arc<CheckoutService>,
    pub currency: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/users", post(create_user))
        .route("/api/v1/users/:id", get(get_user))
        .route("/api/v1/categories", get(list_categories).post(create_category))
        .route("/api/v1/categories/:id", get(get_category).delete(delete_category))
        .route("/api/v1/products", get(list_products).post(create_product))
        .route(
            "/api/v1/products/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/api/v1/products/:id/reviews", get(list_reviews).post(create_review))
        .route("/api/v1/cart/:user_id", get(get_cart).post(add_to_cart))
        .route("/api/v1/cart/:user_id/items/:product_id", axum::routing::delete(remove_cart_item))
        .route("/api/v1/checkout/:user_id", post(initiate_checkout))
        .route("/api/v1/orders/:user_id", get(list_orders).post(create_order))
        .route("/api/v1/orders/:user_id/:order_id", get(get_order).delete(delete_order))
        .route("/api/v1/orders/:user_id/:order_id/items", post(add_order_item))
        .route("/api/v1/webhooks/payment", post(payment_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy", "service": "storefront"}))
}

// -- users ----------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 255))]
    pub username: String,
    #[validate(email)]
    pub email: String,
}

async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>)> {
    req.validate()?;
    let user = User::new(req.username, req.email);
    let mut session = state.store.begin().await?;
    if let Err(err) = session.insert_user(&user).await {
        session.rollback().await?;
        return Err(err);
    }
    session.commit().await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<User>> {
    let mut session = state.store.begin().await?;
    let user = session.get_user(id).await;
    session.rollback().await?;
    user?.map(Json).ok_or(Error::NotFound("user"))
}

// -- categories -----------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>> {
    let mut session = state.store.begin().await?;
    let categories = session.list_categories().await;
    session.rollback().await?;
    Ok(Json(categories?))
}

async fn create_category(
    State(state): State<AppState>,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>)> {
    req.validate()?;
    let category = Category::new(req.name, req.description);
    let mut session = state.store.begin().await?;
    if let Err(err) = session.insert_category(&category).await {
        session.rollback().await?;
        return Err(err);
    }
    session.commit().await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Category>> {
    let mut session = state.store.begin().await?;
    let category = session.get_category(id).await;
    session.rollback().await?;
    category?.map(Json).ok_or(Error::NotFound("category"))
}

/// Deletion is blocked while products reference the category.
async fn delete_category(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    let mut session = state.store.begin().await?;
    let result = async {
        if session.get_category(id).await?.is_none() {
            return Err(Error::NotFound("category"));
        }
        if session.count_products_in_category(id).await? > 0 {
            return Err(Error::Conflict(
                "cannot delete category with associated products".into(),
            ));
        }
        session.delete_category(id).await?;
        Ok(())
    }
    .await;
    match result {
        Ok(()) => {
            session.commit().await?;
            Ok(StatusCode::NO_CONTENT)
        }
        Err(err) => {
            session.rollback().await?;
            Err(err)
        }
    }
}

// -- products -------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListProductsParams {
    pub category: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProductRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    #[serde(default)]
    pub stock: u32,
    pub category_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub average_rating: f64,
    pub review_count: usize,
}

async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ListProductsParams>,
) -> Result<Json<Vec<Product>>> {
    let mut session = state.store.begin().await?;
    let products = session.list_products(params.category).await;
    session.rollback().await?;
    Ok(Json(products?))
}

async fn create_product(
    State(state): State<AppState>,
    Json(req): Json<ProductRequest>,
) -> Result<(StatusCode, Json<Product>)> {
    req.validate()?;
    if req.price.is_sign_negative() {
        return Err(Error::Validation("price cannot be negative".into()));
    }
    let mut session = state.store.begin().await?;
    let result = async {
        if let Some(category_id) = req.category_id {
            if session.get_category(category_id).await?.is_none() {
                return Err(Error::Validation("invalid category id".into()));
            }
        }
        let mut product =
            Product::new(req.name.clone(), Money::new(req.price, &state.currency), req.stock);
        product.description = req.description.clone();
        product.category_id = req.category_id;
        session.insert_product(&product).await?;
        Ok(product)
    }
    .await;
    match result {
        Ok(product) => {
            session.commit().await?;
            Ok((StatusCode::CREATED, Json(product)))
        }
        Err(err) => {
            session.rollback().await?;
            Err(err)
        }
    }
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProductDetail>> {
    let mut session = state.store.begin().await?;
    let result = async {
        let product = session.get_product(id).await?.ok_or(Error::NotFound("product"))?;
        let reviews = session.list_reviews(id).await?;
        Ok(ProductDetail {
            average_rating: average_rating(&reviews),
            review_count: reviews.len(),
            product,
        })
    }
    .await;
    session.rollback().await?;
    result.map(Json)
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ProductRequest>,
) -> Result<Json<Product>> {
    req.validate()?;
    if req.price.is_sign_negative() {
        return Err(Error::Validation("price cannot be negative".into()));
    }
    let mut session = state.store.begin().await?;
    let result = async {
        let mut product = session.get_product(id).await?.ok_or(Error::NotFound("product"))?;
        if let Some(category_id) = req.category_id {
            if session.get_category(category_id).await?.is_none() {
                return Err(Error::Validation("invalid category id".into()));
            }
        }
        product.name = req.name.clone();
        product.description = req.description.clone();
        product.price = Money::new(req.price, product.price.currency());
        product.stock = req.stock;
        product.category_id = req.category_id;
        product.touch();
        session.update_product(&product).await?;
        Ok(product)
    }
    .await;
    match result {
        Ok(product) => {
            session.commit().await?;
            Ok(Json(product))
        }
        Err(err) => {
            session.rollback().await?;
            Err(err)
        }
    }
}

async fn delete_product(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    let mut session = state.store.begin().await?;
    let deleted = session.soft_delete_product(id).await?;
    if deleted {
        session.commit().await?;
        Ok(StatusCode::NO_CONTENT)
    } else {
        session.rollback().await?;
        Err(Error::NotFound("product"))
    }
}

// -- reviews --------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReviewRequest {
    pub user_id: Uuid,
    #[validate(range(min = 1, max = 5))]
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Serialize)]
pub struct ReviewList {
    pub reviews: Vec<Review>,
    pub average_rating: f64,
}

async fn list_reviews(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<ReviewList>> {
    let mut session = state.store.begin().await?;
    let result = async {
        session.get_product(product_id).await?.ok_or(Error::NotFound("product"))?;
        session.list_reviews(product_id).await
    }
    .await;
    session.rollback().await?;
    let reviews = result?;
    Ok(Json(ReviewList { average_rating: average_rating(&reviews), reviews }))
}

async fn create_review(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(req): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Review>)> {
    req.validate()?;
    let mut session = state.store.begin().await?;
    let result = async {
        session.get_product(product_id).await?.ok_or(Error::NotFound("product"))?;
        session.get_user(req.user_id).await?.ok_or(Error::NotFound("user"))?;
        let review = Review::new(req.user_id, product_id, req.rating, req.comment.clone());
        session.insert_review(&review).await?;
        Ok(review)
    }
    .await;
    match result {
        Ok(review) => {
            session.commit().await?;
            Ok((StatusCode::CREATED, Json(review)))
        }
        Err(err) => {
            session.rollback().await?;
            Err(err)
        }
    }
}

// -- cart -----------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: u32,
}

async fn get_cart(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<CartView>> {
    Ok(Json(state.checkout.cart_view(user_id).await?))
}

async fn add_to_cart(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<AddToCartRequest>,
) -> Result<(StatusCode, Json<CartEntry>)> {
    req.validate()?;
    let entry = state.checkout.add_to_cart(user_id, req.product_id, req.quantity).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn remove_cart_item(
    State(state): State<AppState>,
    Path((user_id, product_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    state.checkout.remove_from_cart(user_id, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- checkout + webhook ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: String,
}

async fn initiate_checkout(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<CheckoutResponse>> {
    let hosted = state.checkout.initiate_checkout(user_id).await?;
    Ok(Json(CheckoutResponse { session_id: hosted.id, url: hosted.url }))
}

async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| Error::Validation("missing signature header".into()))?;

    match state.checkout.handle_webhook(&body, signature).await {
        Ok(FulfillmentOutcome::Fulfilled(order)) => Ok(Json(serde_json::json!({
            "status": "fulfilled",
            "order_id": order.id,
            "order_number": order.order_number,
            "total": order.total_price.amount(),
        }))),
        // The provider retries on non-2xx; a replayed delivery is settled.
        Ok(FulfillmentOutcome::AlreadyProcessed) | Err(Error::DuplicateFulfillment) => {
            Ok(Json(serde_json::json!({"status": "already_processed"})))
        }
        Ok(FulfillmentOutcome::Ignored) => Ok(Json(serde_json::json!({"status": "ignored"}))),
        Err(err) => Err(err),
    }
}

// -- orders ---------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddOrderItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: u32,
}

async fn list_orders(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(state.checkout.list_orders(user_id).await?))
}

async fn create_order(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Order>)> {
    let order = state.checkout.create_order(user_id).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn get_order(
    State(state): State<AppState>,
    Path((user_id, order_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<OrderDetail>> {
    let (order, items) = state.checkout.get_order(user_id, order_id).await?;
    Ok(Json(OrderDetail { order, items }))
}

async fn delete_order(
    State(state): State<AppState>,
    Path((user_id, order_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    state.checkout.delete_order(user_id, order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_order_item(
    State(state): State<AppState>,
    Path((user_id, order_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<AddOrderItemRequest>,
) -> Result<(StatusCode, Json<OrderItem>)> {
    req.validate()?;
    let item = state
        .checkout
        .add_item_to_order(user_id, order_id, req.product_id, req.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}
