//! HTTP routes for the score service.
//!
//! Defines the Axum router and application state.

use crate::auth::{KeySetCache, TokenVerifier};
use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_auth, AuthState};
use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Shared key-set cache, also read by the health handler.
    pub key_set_cache: Arc<KeySetCache>,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/` - Greeting (public)
/// - `/health` - Key-set cache state (public)
/// - `/metrics` - Prometheus metrics (public)
/// - `/api/v1/me` - Authenticated subject (behind the verification gate)
///
/// Layers, outermost first: HTTP metrics, 30 second timeout, request tracing.
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let token_verifier = Arc::new(TokenVerifier::new(
        Arc::clone(&state.key_set_cache),
        state.config.jwt_clock_skew,
    ));
    let auth_state = Arc::new(AuthState { token_verifier });

    let public_routes = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // route_layer so unmatched paths under /api still 404 instead of 401
    let protected_routes = Router::new()
        .route("/api/v1/me", get(handlers::get_me))
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth))
        .with_state(state);

    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}
