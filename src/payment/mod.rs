//! Payment provider capability.
//!
//! The provider is an injected dependency: configured once at startup and
//! passed to the checkout orchestrator, never reached through process-global
//! state. The service only ever asks it for a hosted payment session; the
//! provider calls back over the webhook endpoint when the shopper pays.

pub mod rest;
pub mod signature;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use rest::RestPaymentClient;

/// One line of a hosted-session request. `unit_amount` is in the smallest
/// currency unit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionLineItem {
    pub name: String,
    pub unit_amount: i64,
    pub quantity: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRequest {
    pub line_items: Vec<SessionLineItem>,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: HashMap<String, String>,
}

/// A provider-managed checkout page, referenced by its session id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HostedSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_hosted_session(
        &self,
        request: SessionRequest,
    ) -> Result<HostedSession, ProviderError>;
}
