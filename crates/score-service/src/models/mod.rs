//! Response models for the score service HTTP API.

use serde::{Deserialize, Serialize};

/// Health check response.
///
/// Returned by the `/health` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service health status ("healthy" or "degraded").
    pub status: String,

    /// State of the cached key set ("fresh", "stale" or "absent").
    pub key_set: String,
}

/// Response for the `/api/v1/me` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    /// Authenticated subject identifier.
    pub sub: String,
}
