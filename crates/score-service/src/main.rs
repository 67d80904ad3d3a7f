//! Score Service
//!
//! Entry point for the Archy score API.

use score_service::auth::{HttpKeySetFetcher, KeySetCache, KeySetFetcher};
use score_service::config::{Config, LogFormat};
use score_service::observability::metrics::init_metrics_recorder;
use score_service::routes::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration is read first so LOG_FORMAT can pick the formatter;
    // a load error is reported once tracing is up.
    let config = Config::from_env();
    let log_format = config
        .as_ref()
        .map(|c| c.log_format)
        .unwrap_or(LogFormat::Text);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "score_service=info,scores=info,tower_http=info".into()),
        )
        .with((log_format == LogFormat::Json).then(|| tracing_subscriber::fmt::layer().json()))
        .with((log_format == LogFormat::Text).then(tracing_subscriber::fmt::layer))
        .init();

    info!("Starting Score Service");

    let config = config.map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        auth_service_url = %config.auth_service_url,
        bind_address = %config.bind_address,
        jwks_refresh_interval_secs = config.jwks_refresh_interval.as_secs(),
        jwt_clock_skew_secs = config.jwt_clock_skew.as_secs(),
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics: {}", e);
        e
    })?;

    let fetcher: Arc<dyn KeySetFetcher> = Arc::new(HttpKeySetFetcher::new(
        &config.auth_service_url,
        config.jwks_fetch_timeout,
    ));
    let key_set_cache = Arc::new(KeySetCache::with_fetcher(
        fetcher,
        config.jwks_refresh_interval,
    ));

    // Protected routes cannot be served without keys
    key_set_cache.initialize().await.map_err(|e| {
        error!("Failed to initialize key set cache: {}", e);
        e
    })?;

    let bind_address = config.bind_address.clone();
    let drain_period = config.drain_period;

    let state = Arc::new(AppState {
        config,
        key_set_cache,
    });

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Score Service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(drain_period))
        .await?;

    info!("Score Service shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and the drain period is complete.
async fn shutdown_signal(drain_period: Duration) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    if drain_period.is_zero() {
        info!("Skipping drain period (DRAIN_SECONDS=0)");
    } else {
        warn!("Draining connections for {} seconds...", drain_period.as_secs());
        tokio::time::sleep(drain_period).await;
        info!("Drain period complete");
    }
}
