//! Test server harness for E2E testing
//!
//! Provides `TestScoreServer` for spawning real score service instances in
//! tests, pointed at a (usually mocked) auth service.

use score_service::auth::{HttpKeySetFetcher, KeySetCache, KeySetFetcher};
use score_service::config::Config;
use score_service::observability::metrics::init_metrics_recorder;
use score_service::routes::{self, AppState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the score service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health_e2e() -> Result<(), anyhow::Error> {
///     let issuer = MockIssuer::start(&[&TestKeypair::new(1, "k1")]).await;
///     let server = TestScoreServer::spawn(&issuer.url()).await?;
///
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestScoreServer {
    addr: SocketAddr,
    config: Config,
    key_set_cache: Arc<KeySetCache>,
    _handle: JoinHandle<()>,
}

impl TestScoreServer {
    /// Spawn a server that trusts keys published by `auth_service_url`.
    ///
    /// Follows the production startup order: the key-set cache is
    /// initialized before the listener is bound, and an initialization
    /// failure is returned as an error.
    pub async fn spawn(auth_service_url: &str) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(auth_service_url, &[]).await
    }

    /// Like [`TestScoreServer::spawn`] with extra configuration variables,
    /// e.g. `("JWKS_REFRESH_INTERVAL_SECONDS", "1")`.
    pub async fn spawn_with_vars(
        auth_service_url: &str,
        extra_vars: &[(&str, &str)],
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("AUTH_SERVICE_URL".to_string(), auth_service_url.to_string()),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        ]);
        for (name, value) in extra_vars {
            vars.insert((*name).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let fetcher: Arc<dyn KeySetFetcher> = Arc::new(HttpKeySetFetcher::new(
            &config.auth_service_url,
            config.jwks_fetch_timeout,
        ));
        let key_set_cache = Arc::new(KeySetCache::with_fetcher(
            fetcher,
            config.jwks_refresh_interval,
        ));

        key_set_cache
            .initialize()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize key set cache: {}", e))?;

        let state = Arc::new(AppState {
            config: config.clone(),
            key_set_cache: Arc::clone(&key_set_cache),
        });

        // The global recorder can only be installed once per test process;
        // later servers get a standalone recorder.
        let metrics_handle = match init_metrics_recorder() {
            Ok(handle) => handle,
            Err(_) => {
                use metrics_exporter_prometheus::PrometheusBuilder;
                let recorder = PrometheusBuilder::new().build_recorder();
                recorder.handle()
            }
        };

        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            key_set_cache,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The key-set cache the running server verifies with.
    pub fn key_set_cache(&self) -> &Arc<KeySetCache> {
        &self.key_set_cache
    }
}

impl Drop for TestScoreServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
