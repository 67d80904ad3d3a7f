//! Liveness and health handlers.
//!
//! - `/`: greeting, returns as long as the process serves requests
//! - `/health`: reports key-set cache state without triggering a fetch

use crate::auth::KeySetStatus;
use crate::models::HealthResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;

/// Handler for GET /
pub async fn root() -> &'static str {
    "Hello, Archy!"
}

/// Health check handler.
///
/// Never fetches: a stale key set is refreshed by the next authenticated
/// request, so only an absent one is reported as degraded. Always 200 so
/// the body reaches the caller.
///
/// ## Example Response
///
/// ```json
/// { "status": "healthy", "key_set": "fresh" }
/// ```
#[tracing::instrument(skip_all, name = "scores.handlers.health")]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let key_set = state.key_set_cache.status().await;

    let status = match key_set {
        KeySetStatus::Fresh | KeySetStatus::Stale => "healthy",
        KeySetStatus::Absent => {
            tracing::warn!(target: "scores.handlers.health", "Health check degraded: no key set cached");
            "degraded"
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        key_set: key_set.as_str().to_string(),
    })
}
