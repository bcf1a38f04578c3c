// SPDX-License-Identifier: MIT
//! Telemetry bootstrap: OTLP trace & log providers plus the composite subscriber.
//!
//! Setup happens in two steps so the console output never depends on where
//! telemetry is routed:
//!
//! * [`init_providers`] – builds the tracer and logger providers, installs the global
//!   tracer provider and the W3C trace-context propagator, and returns a [`TelemetryGuard`].
//! * [`subscriber`] – builds the `tracing` subscriber that fans every event out to the
//!   console and to the OTLP log bridge, and exports spans through the tracer provider.
//!
//! # Example
//! ```no_run
//! use cloudificando_api::telemetry::{init_providers, subscriber, TelemetryConfig};
//! use tracing_subscriber::util::SubscriberInitExt;
//! fn main() -> anyhow::Result<()> {
//!     let guard = init_providers(&TelemetryConfig::default())?;
//!     subscriber(&guard).init();
//!     // ... application logic ...
//!     guard.shutdown()?; // ensure final spans & logs are exported
//!     Ok(())
//! }
//! ```
//!
//! # Shutdown
//! Call [`TelemetryGuard::shutdown`] at a controlled point before the Tokio runtime exits.
//! A guard dropped without an explicit shutdown (e.g. on an early `?` return) shuts the
//! providers down itself, so every exit path flushes exactly once.
//!
//! # Threading Model
//! Batch exporters spawn worker threads (using the blocking HTTP client). No explicit async runtime handle
//! is required beyond constructing telemetry inside a Tokio context.
use anyhow::Result;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, Protocol, SpanExporter, WithExportConfig};
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use tracing::level_filters::LevelFilter;
use tracing::Subscriber;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer, Registry};

/// Instrumentation scope name used for the tracer handed to `tracing-opentelemetry`.
pub const INSTRUMENTATION_SCOPE: &str = env!("CARGO_PKG_NAME");

/// Targets whose events must never reach the OTLP log bridge: the exporter's own
/// HTTP stack would otherwise log about every export it performs.
const EXPORTER_TARGETS: &[&str] = &[
    "opentelemetry",
    "opentelemetry_sdk",
    "opentelemetry_otlp",
    "reqwest",
    "hyper",
    "hyper_util",
    "h2",
];

/// Configuration used when initializing telemetry.
///
/// Values are sourced from environment variables if available:
/// * `OTEL_EXPORTER_OTLP_ENDPOINT` – base endpoint (e.g. `http://localhost:4318`).
/// * `OTEL_SERVICE_NAME` – service name resource attribute.
/// * `RUST_ENV` – deployment environment (added as `deployment.environment`).
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Base OTLP endpoint (without per-signal suffix). Example: `http://localhost:4318`.
    pub endpoint: String,
    /// Service name reported in resource attributes (`service.name`).
    pub service_name: String,
    /// Service version reported in resource attributes (`service.version`).
    pub service_version: String,
    /// Deployment environment reported as `deployment.environment`.
    pub environment: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4318".to_string()),
            service_name: std::env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| "api.cloudificando.com".to_string()),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: std::env::var("RUST_ENV").unwrap_or_else(|_| "dev".into()),
        }
    }
}

impl TelemetryConfig {
    fn resource(&self) -> Resource {
        Resource::builder()
            .with_service_name(self.service_name.clone())
            .with_attributes([
                KeyValue::new("service.version", self.service_version.clone()),
                KeyValue::new("deployment.environment", self.environment.clone()),
            ])
            .build()
    }

    /// Per-signal OTLP/HTTP endpoint, e.g. `http://localhost:4318/v1/traces`.
    pub fn signal_endpoint(&self, signal: &str) -> String {
        format!("{}/v1/{}", self.endpoint.trim_end_matches('/'), signal)
    }
}

/// Owns the tracer and logger providers for the lifetime of the process.
///
/// Shutdown runs exactly once: either through [`TelemetryGuard::shutdown`] or,
/// failing that, when the guard is dropped.
pub struct TelemetryGuard {
    tracer_provider: SdkTracerProvider,
    logger_provider: SdkLoggerProvider,
    shut_down: bool,
}

impl TelemetryGuard {
    /// Wrap already-built providers. [`init_providers`] is the usual constructor; this one
    /// lets callers supply providers with their own exporters.
    pub fn new(tracer_provider: SdkTracerProvider, logger_provider: SdkLoggerProvider) -> Self {
        Self {
            tracer_provider,
            logger_provider,
            shut_down: false,
        }
    }

    pub fn tracer_provider(&self) -> &SdkTracerProvider {
        &self.tracer_provider
    }

    pub fn logger_provider(&self) -> &SdkLoggerProvider {
        &self.logger_provider
    }

    /// Flush and shutdown both providers.
    ///
    /// Returns `Ok(())` if every provider shut down cleanly. If one or both report an
    /// error, a combined `anyhow::Error` naming each failing component is returned.
    pub fn shutdown(mut self) -> Result<()> {
        self.shut_down = true;
        self.shutdown_providers()
    }

    fn shutdown_providers(&self) -> Result<()> {
        let mut errs = Vec::new();
        if let Err(e) = self.tracer_provider.shutdown() {
            errs.push(format!("tracer: {e}"));
        }
        if let Err(e) = self.logger_provider.shutdown() {
            errs.push(format!("logger: {e}"));
        }
        if errs.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(errs.join(", "))
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        // The log pipeline is what is being torn down, so report on stderr.
        if let Err(e) = self.shutdown_providers() {
            eprintln!("telemetry shutdown failed: {e:#}");
        }
    }
}

/// Build the OTLP tracer and logger providers.
///
/// The tracer provider becomes the global tracer provider and the W3C trace-context
/// propagator becomes the global propagator. The logger provider is only wired into
/// logging by [`subscriber`].
///
/// # Errors
/// Returns an error if either exporter builder fails (e.g. invalid endpoint URL). No
/// provider is installed in that case.
pub fn init_providers(cfg: &TelemetryConfig) -> Result<TelemetryGuard> {
    let resource = cfg.resource();

    // Build exporters (HTTP binary OTLP)
    let span_exporter = SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(cfg.signal_endpoint("traces"))
        .build()?;

    let log_exporter = LogExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(cfg.signal_endpoint("logs"))
        .build()?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(span_exporter)
        .with_resource(resource.clone())
        .build();

    let logger_provider = SdkLoggerProvider::builder()
        .with_batch_exporter(log_exporter)
        .with_resource(resource)
        .build();

    global::set_tracer_provider(tracer_provider.clone());
    global::set_text_map_propagator(TraceContextPropagator::new());

    Ok(TelemetryGuard::new(tracer_provider, logger_provider))
}

/// Compose the process subscriber from the guard's providers.
///
/// Every event that passes the `RUST_LOG` filter (default `info`) goes to both the
/// compact console layer and the OTLP log bridge; spans are exported through the
/// tracer provider so log records carry the trace id of the span they were emitted in.
pub fn subscriber(guard: &TelemetryGuard) -> impl Subscriber + Send + Sync + 'static {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Console formatting: plain compact single-line output with source location.
    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .compact();

    let bridge_layer = OpenTelemetryTracingBridge::new(guard.logger_provider())
        .with_filter(exporter_silencer());

    let otel_trace_layer =
        OpenTelemetryLayer::new(guard.tracer_provider().tracer(INSTRUMENTATION_SCOPE));

    Registry::default()
        .with(filter)
        .with(console_layer)
        .with(bridge_layer)
        .with(otel_trace_layer)
}

fn exporter_silencer() -> Targets {
    EXPORTER_TARGETS
        .iter()
        .fold(Targets::new().with_default(LevelFilter::TRACE), |targets, target| {
            targets.with_target(*target, LevelFilter::OFF)
        })
}
