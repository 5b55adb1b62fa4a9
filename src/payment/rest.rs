//! JSON-over-HTTP payment provider client.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{HostedSession, PaymentProvider, ProviderError, SessionRequest};

#[derive(Clone)]
pub struct RestPaymentClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Deserialize)]
struct SessionResponse {
    id: String,
    url: String,
}

impl RestPaymentClient {
    pub fn new(endpoint: String, api_key: String, timeout: Duration) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        Ok(Self { http, endpoint, api_key })
    }
}

#[async_trait]
impl PaymentProvider for RestPaymentClient {
    async fn create_hosted_session(
        &self,
        request: SessionRequest,
    ) -> Result<HostedSession, ProviderError> {
        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(HostedSession { id: session.id, url: session.url })
    }
}
