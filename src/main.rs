// SPDX-License-Identifier: MIT
use std::sync::Arc;

use anyhow::{Context, Result};
use cloudificando_api::http::{router, serve, AppState, ServerConfig};
use cloudificando_api::storage;
use cloudificando_api::telemetry::{init_providers, subscriber, TelemetryConfig};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<()> {
    // Any early return below drops the guard, which flushes and shuts the providers down.
    let telemetry = init_providers(&TelemetryConfig::default()).context("telemetry bootstrap")?;
    subscriber(&telemetry).init();

    let store = storage::connect().await.context("AWS configuration")?;

    info!("Cold start");
    let app = router(AppState {
        store: Arc::new(store),
    });

    let config = ServerConfig::default();
    let listener = TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("bind {}", config.bind_address))?;
    serve(listener, app).await?;

    info!("shutting down");
    telemetry.shutdown()?;
    Ok(())
}
