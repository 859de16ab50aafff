//! HTTP server: `/metrics` and `/health`.

use adguard_exporter_core::registry::content_type;
use adguard_exporter_core::{ExporterMetrics, HealthChecker};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<ExporterMetrics>,
    pub self_metrics: PrometheusHandle,
    pub health: HealthChecker,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Appliance families first, then the exporter's own counters.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(mut body) => {
            body.push_str(&state.self_metrics.render());
            ([(header::CONTENT_TYPE, content_type())], body).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.health.get_health().await)
}

/// Serve on all interfaces at `port` until `shutdown` fires or closes.
pub async fn serve(
    state: AppState,
    port: u16,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics available at http://{}/metrics", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    info!("HTTP server stopped");
    Ok(())
}
