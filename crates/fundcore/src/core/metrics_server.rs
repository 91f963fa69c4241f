//! HTTP server for health checks and Prometheus metrics
//!
//! Railway probes `/health`; Prometheus scrapes `/metrics`. Listens on
//! METRICS_PORT / PORT (default 9090).

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::Instant;

use crate::core::error::AppResult;
use crate::core::metrics;

/// Application state for the metrics server
#[derive(Clone)]
struct AppState {
    start_time: Instant,
}

/// Builds the router with `/metrics`, `/health` and `/ready`.
pub fn router() -> Router {
    let state = AppState {
        start_time: Instant::now(),
    };

    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(Arc::new(state))
}

/// Start the metrics HTTP server and serve until the task is dropped.
pub async fn start_metrics_server(port: u16) -> AppResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    log::info!("Starting metrics server on http://{}", addr);
    log::info!("  /metrics - Prometheus metrics");
    log::info!("  /health  - Health check (liveness)");
    log::info!("  /ready   - Readiness check");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router()).await?;

    Ok(())
}

/// Returns Prometheus metrics in text exposition format
async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(e) => {
            log::error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to encode metrics: {}", e)).into_response()
        }
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed();

    let health_status = serde_json::json!({
        "status": "healthy",
        "uptime_seconds": uptime.as_secs(),
        "uptime_human": format_duration(uptime),
        "scheduled_users": metrics::SCHEDULED_USERS.get() as u64,
        "service": "fundbot",
        "version": env!("CARGO_PKG_VERSION"),
    });

    (StatusCode::OK, axum::Json(health_status))
}

/// Ready once the process has been up for a few seconds
async fn ready_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed();

    if uptime.as_secs() < 5 {
        let status = serde_json::json!({
            "status": "starting",
            "uptime_seconds": uptime.as_secs(),
        });
        return (StatusCode::SERVICE_UNAVAILABLE, axum::Json(status));
    }

    let status = serde_json::json!({
        "status": "ready",
        "uptime_seconds": uptime.as_secs(),
    });

    (StatusCode::OK, axum::Json(status))
}

/// Format duration as human-readable string
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let days = total_secs / 86400;
    let hours = (total_secs % 86400) / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if days > 0 {
        format!("{}d {}h {}m {}s", days, hours, minutes, seconds)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
        assert_eq!(format_duration(Duration::from_secs(90061)), "1d 1h 1m 1s");
    }

    #[tokio::test]
    async fn test_metrics_handler_ok() {
        metrics::init_metrics();
        let response = metrics_handler().await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_is_unavailable_right_after_start() {
        let state = Arc::new(AppState {
            start_time: Instant::now(),
        });
        let response = ready_handler(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
