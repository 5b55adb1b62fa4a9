//! Error taxonomy shared across the service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("cart is empty")]
    EmptyCart,

    #[error("insufficient stock for {product}")]
    InsufficientStock { product: String },

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("payment provider error: {0}")]
    PaymentProvider(String),

    #[error("payment session already fulfilled")]
    DuplicateFulfillment,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl Error {
    /// Stable machine-readable tag for the structured error body.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::EmptyCart => "empty_cart",
            Error::InsufficientStock { .. } => "insufficient_stock",
            Error::InvalidSignature => "invalid_signature",
            Error::PaymentProvider(_) => "payment_provider_error",
            Error::DuplicateFulfillment => "duplicate_fulfillment",
            Error::Conflict(_) => "conflict",
            Error::Validation(_) => "validation",
            Error::Storage(_) => "storage",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::EmptyCart | Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::InsufficientStock { .. } | Error::Conflict(_) | Error::DuplicateFulfillment => {
                StatusCode::CONFLICT
            }
            Error::InvalidSignature => StatusCode::UNAUTHORIZED,
            Error::PaymentProvider(_) => StatusCode::BAD_GATEWAY,
            Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Error::Validation(errors.to_string())
    }
}

impl From<crate::domain::value_objects::MoneyError> for Error {
    fn from(_: crate::domain::value_objects::MoneyError) -> Self {
        Error::Validation("mixed currencies in one order".into())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        let message = match &self {
            // Do not leak backend details to callers.
            Error::Storage(_) => "internal storage error".to_string(),
            other => other.to_string(),
        };
        let body = serde_json::json!({
            "error": { "kind": self.kind(), "message": message }
        });
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
