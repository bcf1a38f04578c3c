// SPDX-License-Identifier: MIT
//! Small DynamoDB-backed HTTP API instrumented with `tracing` + OpenTelemetry.
//!
//! * Traces and logs are exported over OTLP/HTTP; every log event is also printed to the console.
//! * `GET /tables` lists DynamoDB tables, `GET /ping` and `GET /ping/{id}` answer liveness probes.
//! * Inbound W3C trace context becomes the parent of the request span, and outbound
//!   DynamoDB calls carry the active trace context.
//!
//! Modules:
//! * [`telemetry`] – provider bootstrap ([`telemetry::init_providers`]), the composite
//!   subscriber ([`telemetry::subscriber`]) and scoped shutdown ([`telemetry::TelemetryGuard`]).
//! * [`storage`] – [`storage::TableStore`] and its DynamoDB implementation.
//! * [`http`] – router, handlers and server loop.
//! * [`propagation`] – trace-context header extraction/injection.
//!
//! # Quick Start
//! ```no_run
//! use cloudificando_api::http::{router, serve, AppState, ServerConfig};
//! use cloudificando_api::telemetry::{init_providers, subscriber, TelemetryConfig};
//! use std::sync::Arc;
//! use tracing_subscriber::util::SubscriberInitExt;
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let telemetry = init_providers(&TelemetryConfig::default())?;
//!     subscriber(&telemetry).init();
//!     let store = cloudificando_api::storage::connect().await?;
//!     let listener = tokio::net::TcpListener::bind(ServerConfig::default().bind_address).await?;
//!     serve(listener, router(AppState { store: Arc::new(store) })).await?;
//!     telemetry.shutdown()?;
//!     Ok(())
//! }
//! ```
pub mod http;
pub mod propagation;
pub mod storage;
pub mod telemetry;
