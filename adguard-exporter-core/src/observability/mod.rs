//! Observability infrastructure: tracing, self-metrics, health checks.
//!
//! The exporter's own counters (ticks, fetch latency, fetch failures) go
//! through the `metrics` facade and are rendered by a `PrometheusHandle`
//! next to the appliance metrics on `/metrics`.

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{self, RandomIdGenerator, Sampler};
use opentelemetry_sdk::Resource;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod health;
pub mod metrics;

/// Check if OTLP tracing is enabled via environment variable.
/// Set ADGUARD_EXPORTER_OTLP_ENABLED=1 or OTEL_EXPORTER_OTLP_ENDPOINT to enable.
fn otlp_enabled() -> bool {
    std::env::var("ADGUARD_EXPORTER_OTLP_ENABLED").is_ok()
        || std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok()
}

/// Get the OTLP endpoint (default: http://localhost:4317)
fn otlp_endpoint() -> String {
    std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:4317".to_string())
}

/// Initialize logging and the self-metrics recorder.
///
/// Must be called once at startup. `debug` lowers the default level to DEBUG;
/// `RUST_LOG` directives still apply on top.
pub fn init(debug: bool) -> Result<PrometheusHandle, Box<dyn std::error::Error>> {
    let level = if debug { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .with(tracing_subscriber::fmt::layer().with_target(true).with_level(true));

    if otlp_enabled() {
        let endpoint = otlp_endpoint();

        let exporter = opentelemetry_otlp::new_exporter().tonic().with_endpoint(&endpoint);

        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(exporter)
            .with_trace_config(
                trace::config()
                    .with_sampler(Sampler::AlwaysOn)
                    .with_id_generator(RandomIdGenerator::default())
                    .with_resource(Resource::new(vec![
                        opentelemetry::KeyValue::new("service.name", "adguard-exporter"),
                        opentelemetry::KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                    ])),
            )
            .install_batch(opentelemetry_sdk::runtime::Tokio)?;

        let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);
        subscriber.with(telemetry).init();
        tracing::info!("Observability initialized with OTLP tracing (endpoint: {})", endpoint);
    } else {
        subscriber.init();
        tracing::debug!("Observability initialized (OTLP disabled)");
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(metrics::FETCH_DURATION.to_string()),
            metrics::FETCH_DURATION_BUCKETS,
        )?
        .install_recorder()?;

    metrics::register_exporter_metrics();

    Ok(handle)
}

/// Shutdown observability infrastructure gracefully.
pub fn shutdown() {
    opentelemetry::global::shutdown_tracer_provider();
}
