//! Metrics definitions for the score service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `scores_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: HTTP methods only
//! - `endpoint`: the known routes plus `/other`
//! - `status`: success, error, timeout
//! - `error_type`: bounded by error variants
//! - `result`: hit, refresh

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used to render
/// `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("scores_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Key-set fetches are bounded by the fetch timeout (10s default)
        .set_buckets_for_metric(
            Matcher::Prefix("scores_jwks_fetch".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set key set fetch buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `scores_http_requests_total`, `scores_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status` / `status_code`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("scores_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("scores_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Map a request path to a bounded endpoint label.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/" => "/",
        "/health" => "/health",
        "/metrics" => "/metrics",
        "/api/v1/me" => "/api/v1/me",
        _ => "/other",
    }
}

// ============================================================================
// Key Set Metrics
// ============================================================================

/// Record a key-set fetch from the auth service.
///
/// Metric: `scores_jwks_fetch_total`, `scores_jwks_fetch_duration_seconds`,
/// `scores_jwks_fetch_failures_total`
/// Labels: `status`, `error_type` (failures only: timeout, http, status, parse)
pub fn record_jwks_fetch(status: &str, error_type: Option<&str>, duration: Duration) {
    counter!("scores_jwks_fetch_total", "status" => status.to_string()).increment(1);

    histogram!("scores_jwks_fetch_duration_seconds", "status" => status.to_string())
        .record(duration.as_secs_f64());

    if let Some(err_type) = error_type {
        counter!("scores_jwks_fetch_failures_total", "error_type" => err_type.to_string())
            .increment(1);
    }
}

/// Record a key-set cache lookup.
///
/// Metric: `scores_jwks_cache_total`
/// Labels: `result` (hit, refresh)
pub fn record_jwks_cache_lookup(result: &str) {
    counter!("scores_jwks_cache_total", "result" => result.to_string()).increment(1);
}

// ============================================================================
// Authentication Metrics
// ============================================================================

/// Record the outcome of the verification gate.
///
/// Metric: `scores_auth_total`
/// Labels: `outcome` (success, failure), `error_type` (`none` on success)
pub fn record_auth_result(outcome: &str, error_type: Option<&str>) {
    counter!("scores_auth_total",
        "outcome" => outcome.to_string(),
        "error_type" => error_type.unwrap_or("none").to_string()
    )
    .increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    // Recording with no recorder installed goes to a no-op recorder, so these
    // only need to not panic.

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/health", 200, Duration::from_millis(5));
        record_http_request("GET", "/api/v1/me", 200, Duration::from_millis(50));
        record_http_request("GET", "/api/v1/me", 401, Duration::from_millis(10));
        record_http_request("GET", "/nope", 404, Duration::from_millis(1));
        record_http_request("GET", "/api/v1/me", 504, Duration::from_secs(30));
    }

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(204), "success");
        assert_eq!(categorize_status_code(401), "error");
        assert_eq!(categorize_status_code(500), "error");
        assert_eq!(categorize_status_code(408), "timeout");
        assert_eq!(categorize_status_code(504), "timeout");
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("/"), "/");
        assert_eq!(normalize_endpoint("/health"), "/health");
        assert_eq!(normalize_endpoint("/metrics"), "/metrics");
        assert_eq!(normalize_endpoint("/api/v1/me"), "/api/v1/me");
        assert_eq!(normalize_endpoint("/api/v1/me/extra"), "/other");
        assert_eq!(normalize_endpoint("/api/v1/users/12345"), "/other");
    }

    #[test]
    fn test_key_set_and_auth_metrics_are_recorded() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_jwks_fetch("success", None, Duration::from_millis(20));
            record_jwks_fetch("error", Some("status"), Duration::from_millis(5));
            record_jwks_cache_lookup("hit");
            record_jwks_cache_lookup("hit");
            record_jwks_cache_lookup("refresh");
            record_auth_result("success", None);
            record_auth_result("failure", Some("invalid_token"));
        });

        let snapshot = snapshotter.snapshot().into_vec();

        let counter_value = |name: &str, label: (&str, &str)| -> u64 {
            snapshot
                .iter()
                .filter(|(key, _, _, _)| {
                    key.key().name() == name
                        && key
                            .key()
                            .labels()
                            .any(|l| l.key() == label.0 && l.value() == label.1)
                })
                .map(|(_, _, _, value)| match value {
                    DebugValue::Counter(v) => *v,
                    _ => 0,
                })
                .sum()
        };

        assert_eq!(counter_value("scores_jwks_fetch_total", ("status", "success")), 1);
        assert_eq!(counter_value("scores_jwks_fetch_total", ("status", "error")), 1);
        assert_eq!(
            counter_value("scores_jwks_fetch_failures_total", ("error_type", "status")),
            1
        );
        assert_eq!(counter_value("scores_jwks_cache_total", ("result", "hit")), 2);
        assert_eq!(counter_value("scores_jwks_cache_total", ("result", "refresh")), 1);
        assert_eq!(counter_value("scores_auth_total", ("error_type", "none")), 1);
        assert_eq!(
            counter_value("scores_auth_total", ("error_type", "invalid_token")),
            1
        );
    }
}
