//! Prometheus metrics endpoint handler.
//!
//! # Security
//!
//! Unauthenticated so Prometheus can scrape it. Labels are bounded and
//! carry no subjects or tokens.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
///
/// Returns 200 OK with Prometheus text format:
/// ```text
/// # TYPE scores_http_requests_total counter
/// scores_http_requests_total{method="GET",endpoint="/health",status_code="200"} 42
/// ```
#[tracing::instrument(skip_all, name = "scores.handlers.metrics")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
