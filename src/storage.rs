// SPDX-License-Identifier: MIT
//! DynamoDB-backed table store.
//!
//! Handlers only see the [`TableStore`] trait; [`connect`] resolves the ambient AWS
//! configuration and returns the real [`DynamoStore`].
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_dynamodb::config::interceptors::BeforeTransmitInterceptorContextMut;
use aws_sdk_dynamodb::config::{ConfigBag, Intercept, RuntimeComponents};
use aws_sdk_dynamodb::error::{BoxError, DisplayErrorContext};
use aws_sdk_dynamodb::Client;
use tracing::{debug, instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::propagation::inject_context;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no AWS region configured")]
    MissingRegion,
    #[error("{operation} failed: {detail}")]
    Backend {
        operation: &'static str,
        detail: String,
    },
}

impl StoreError {
    fn backend(operation: &'static str, err: impl std::error::Error) -> Self {
        Self::Backend {
            operation,
            detail: DisplayErrorContext(err).to_string(),
        }
    }
}

/// Read access to the remote table catalogue.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Names of every table, in the order the backend returns them.
    async fn list_tables(&self) -> Result<Vec<String>, StoreError>;
}

/// [`TableStore`] over a DynamoDB client.
#[derive(Clone, Debug)]
pub struct DynamoStore {
    client: Client,
}

impl DynamoStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TableStore for DynamoStore {
    #[instrument(
        name = "DynamoDB.ListTables",
        skip_all,
        fields(
            otel.kind = "client",
            rpc.system = "aws-api",
            rpc.service = "DynamoDB",
            rpc.method = "ListTables",
        )
    )]
    async fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        self.client
            .list_tables()
            .into_paginator()
            .items()
            .send()
            .collect::<Result<Vec<String>, _>>()
            .await
            .map_err(|e| StoreError::backend("ListTables", e))
    }
}

/// Load the ambient AWS configuration and build an instrumented DynamoDB store.
///
/// Resolution order (environment, shared config files, instance metadata) belongs to
/// `aws-config`. Fails when no region could be resolved; credentials are resolved lazily
/// by the default chain, so a missing credential surfaces on the first request instead.
pub async fn connect() -> Result<DynamoStore, StoreError> {
    from_sdk_config(&aws_config::load_from_env().await)
}

fn from_sdk_config(sdk_config: &SdkConfig) -> Result<DynamoStore, StoreError> {
    let region = sdk_config.region().ok_or(StoreError::MissingRegion)?;
    debug!(region = %region, "AWS configuration resolved");

    let config = aws_sdk_dynamodb::config::Builder::from(sdk_config)
        .interceptor(TraceContextInterceptor)
        .build();
    Ok(DynamoStore::new(Client::from_conf(config)))
}

/// Adds the active span's W3C trace context to every outbound DynamoDB request.
#[derive(Debug)]
pub struct TraceContextInterceptor;

impl Intercept for TraceContextInterceptor {
    fn name(&self) -> &'static str {
        "TraceContextInterceptor"
    }

    fn modify_before_signing(
        &self,
        context: &mut BeforeTransmitInterceptorContextMut<'_>,
        _runtime_components: &RuntimeComponents,
        _cfg: &mut ConfigBag,
    ) -> Result<(), BoxError> {
        let cx = tracing::Span::current().context();
        let headers = context.request_mut().headers_mut();
        for (key, value) in inject_context(&cx) {
            headers.try_insert(key, value)?;
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeStore;
    use super::*;
    use crate::telemetry::subscriber;
    use crate::telemetry::testing::in_memory_guard;
    use aws_sdk_dynamodb::config::{BehaviorVersion, Credentials, Region};
    use axum::http::{header, HeaderMap};
    use axum::routing::post;
    use axum::Router;
    use opentelemetry::trace::TraceContextExt;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tracing::Instrument;

    #[tokio::test]
    async fn backend_error_keeps_detail() {
        let store = FakeStore(Err("AccessDeniedException: not authorized".into()));
        let err = store.list_tables().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "ListTables failed: AccessDeniedException: not authorized"
        );
    }

    #[tokio::test]
    async fn preserves_backend_order() {
        let store = FakeStore(Ok(vec!["zeta".into(), "alpha".into()]));
        assert_eq!(store.list_tables().await.unwrap(), ["zeta", "alpha"]);
    }

    #[test]
    fn config_without_region_is_rejected() {
        let err = from_sdk_config(&SdkConfig::builder().build()).unwrap_err();
        assert!(matches!(err, StoreError::MissingRegion));
    }

    /// Local stand-in for the DynamoDB endpoint that reports each request's `traceparent`.
    async fn capturing_endpoint() -> (String, mpsc::UnboundedReceiver<Option<String>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new().route(
            "/",
            post(move |headers: HeaderMap| {
                let tx = tx.clone();
                async move {
                    let traceparent = headers
                        .get("traceparent")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_owned);
                    let _ = tx.send(traceparent);
                    (
                        [(header::CONTENT_TYPE, "application/x-amz-json-1.0")],
                        r#"{"TableNames":["alpha","beta"]}"#,
                    )
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), rx)
    }

    #[tokio::test]
    async fn outbound_requests_carry_enclosing_trace_id() {
        let (endpoint, mut captured) = capturing_endpoint().await;
        let config = aws_sdk_dynamodb::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("AKIDTEST", "secret", None, None, "test"))
            .endpoint_url(endpoint)
            .interceptor(TraceContextInterceptor)
            .build();
        let store = DynamoStore::new(Client::from_conf(config));

        let (guard, _, _) = in_memory_guard();
        let _default = tracing::subscriber::set_default(subscriber(&guard));
        let outer = tracing::info_span!("outer");
        let expected = outer.context().span().span_context().trace_id();

        let tables = store.list_tables().instrument(outer).await.unwrap();
        assert_eq!(tables, ["alpha", "beta"]);

        let traceparent = captured
            .recv()
            .await
            .unwrap()
            .expect("traceparent header");
        let trace_id = traceparent.split('-').nth(1);
        assert_eq!(trace_id, Some(expected.to_string().as_str()));
    }
}
