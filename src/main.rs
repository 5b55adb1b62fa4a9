//! Storefront service entry point.

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::checkout::CheckoutService;
use storefront::config::Config;
use storefront::events::EventPublisher;
use storefront::http::{self, AppState};
use storefront::payment::{PaymentProvider, RestPaymentClient};
use storefront::store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let pg = PgStore::connect(url).await?;
            sqlx::migrate!("./migrations").run(pg.pool()).await?;
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, running on the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let nats = match &config.nats_url {
        Some(url) => async_nats::connect(url).await.ok(),
        None => None,
    };

    let payments: Arc<dyn PaymentProvider> = Arc::new(RestPaymentClient::new(
        config.payment_endpoint.clone(),
        config.payment_api_key.clone(),
        config.provider_timeout,
    )?);

    let checkout = Arc::new(CheckoutService::new(
        Arc::clone(&store),
        payments,
        EventPublisher::new(nats),
        config.checkout_settings(),
    ));

    let state = AppState { store, checkout, currency: config.currency.clone() };
    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!("🚀 storefront listening on 0.0.0.0:{}", config.port);
    axum::serve(listener, app).await?;
    Ok(())
}
