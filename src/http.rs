// SPDX-License-Identifier: MIT
//! HTTP surface: `GET /tables`, `GET /ping`, `GET /ping/{id}`.
//!
//! Every request runs inside a server span whose parent is taken from the inbound
//! W3C `traceparent` header, so handler logs and storage calls share its trace id.
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{MatchedPath, Path, State};
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::field::Empty;
use tracing::{debug, error, info, info_span, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::propagation::extract_context;
use crate::storage::{StoreError, TableStore};

/// Listener configuration. `PORT` (default `8080`) is bound on all interfaces.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(8080);
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], port)),
        }
    }
}

/// Dependencies shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TableStore>,
}

/// Failures a handler can surface to a caller.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl ApiError {
    /// Public status and message for this error. Internal detail never leaves the process.
    pub fn status_and_message(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Unexpected error"),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error) = self.status_and_message();
        (status, Json(ErrorBody { error })).into_response()
    }
}

#[derive(Serialize)]
struct TablesBody {
    tables: Vec<String>,
}

#[derive(Serialize)]
struct PongBody {
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
}

impl PongBody {
    fn new(id: Option<String>) -> Self {
        Self {
            message: "pong",
            id,
        }
    }
}

async fn list_tables(State(state): State<AppState>) -> Result<Json<TablesBody>, ApiError> {
    let tables = state
        .store
        .list_tables()
        .await
        .inspect_err(|e| error!(error = %e, "Failed to list tables"))?;
    info!(tables = ?tables, "Tables");
    Ok(Json(TablesBody { tables }))
}

async fn ping() -> Json<PongBody> {
    info!("Ping endpoint accessed");
    Json(PongBody::new(None))
}

async fn ping_with_id(Path(id): Path<String>) -> Json<PongBody> {
    pong_with_id(id)
}

async fn ping_with_empty_id() -> Json<PongBody> {
    pong_with_id(String::new())
}

fn pong_with_id(id: String) -> Json<PongBody> {
    info!(id = %id, "Ping endpoint accessed with id");
    Json(PongBody::new(Some(id)))
}

fn request_span(request: &Request<Body>) -> Span {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(MatchedPath::as_str)
        .unwrap_or_else(|| request.uri().path());
    let span = info_span!(
        "request",
        otel.name = %format!("{} {}", request.method(), route),
        otel.kind = "server",
        http.request.method = %request.method(),
        http.route = %route,
        url.path = %request.uri().path(),
        http.response.status_code = Empty,
    );
    if let Err(e) = span.set_parent(extract_context(request.headers())) {
        debug!(error = ?e, "inbound trace context not attached");
    }
    span
}

/// Build the application router with request tracing.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/tables", get(list_tables))
        .route("/ping", get(ping))
        .route("/ping/", get(ping_with_empty_id))
        .route("/ping/{id}", get(ping_with_id))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(|response: &Response<Body>, latency: Duration, span: &Span| {
                    span.record("http.response.status_code", response.status().as_u16());
                    debug!(status = response.status().as_u16(), ?latency, "response sent");
                }),
        )
}

/// Serve `router` until Ctrl-C or SIGTERM, then drain in-flight requests.
pub async fn serve(listener: TcpListener, router: Router) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(address = %addr, "HTTP server starting");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
