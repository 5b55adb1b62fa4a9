//! Environment configuration, read once at startup.

use std::time::Duration;

use anyhow::Context;

use crate::checkout::CheckoutSettings;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    /// When unset the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub webhook_secret: String,
    pub payment_endpoint: String,
    pub payment_api_key: String,
    pub provider_timeout: Duration,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = var("PORT").unwrap_or_else(|| "8083".to_string()).parse()?;
        let timeout_secs: u64 = var("PAYMENT_TIMEOUT_SECS")
            .unwrap_or_else(|| "10".to_string())
            .parse()?;
        Ok(Self {
            port,
            database_url: var("DATABASE_URL"),
            nats_url: var("NATS_URL"),
            currency: var("CURRENCY").unwrap_or_else(|| "USD".to_string()),
            success_url: var("CHECKOUT_SUCCESS_URL")
                .unwrap_or_else(|| "http://localhost:8083/checkout/success".to_string()),
            cancel_url: var("CHECKOUT_CANCEL_URL")
                .unwrap_or_else(|| "http://localhost:8083/checkout/cancel".to_string()),
            webhook_secret: var("WEBHOOK_SECRET").context("WEBHOOK_SECRET must be set")?,
            payment_endpoint: var("PAYMENT_ENDPOINT").context("PAYMENT_ENDPOINT must be set")?,
            payment_api_key: var("PAYMENT_API_KEY").context("PAYMENT_API_KEY must be set")?,
            provider_timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn checkout_settings(&self) -> CheckoutSettings {
        CheckoutSettings {
            currency: self.currency.clone(),
            success_url: self.success_url.clone(),
            cancel_url: self.cancel_url.clone(),
            webhook_secret: self.webhook_secret.clone(),
            provider_timeout: self.provider_timeout,
        }
    }
}
