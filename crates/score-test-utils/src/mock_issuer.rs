//! Mock auth service publishing a key set
//!
//! Wraps a `wiremock` server that answers `GET /api/auth/jwks` like the real
//! auth service. Responses can be swapped mid-test to simulate key rotation
//! or outages.

use crate::crypto_fixtures::{jwks_document, TestKeypair};
use score_service::auth::jwks::JWKS_PATH;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock issuer backed by a wiremock server.
///
/// # Example
/// ```rust,ignore
/// let keypair = TestKeypair::new(1, "test-key-1");
/// let issuer = MockIssuer::start(&[&keypair]).await;
/// let cache = KeySetCache::new(&issuer.url());
/// ```
pub struct MockIssuer {
    server: MockServer,
    /// Key-set requests journaled before the last reset.
    fetches_before_reset: AtomicUsize,
}

impl MockIssuer {
    /// Start an issuer publishing `keypairs`.
    pub async fn start(keypairs: &[&TestKeypair]) -> Self {
        let issuer = Self::start_empty().await;
        issuer.publish(keypairs).await;
        issuer
    }

    /// Start an issuer with no routes mounted (every request is a 404).
    pub async fn start_empty() -> Self {
        Self {
            server: MockServer::start().await,
            fetches_before_reset: AtomicUsize::new(0),
        }
    }

    /// Base URL to configure as `AUTH_SERVICE_URL`.
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Replace the published key set.
    pub async fn publish(&self, keypairs: &[&TestKeypair]) {
        self.respond_with(ResponseTemplate::new(200).set_body_json(jwks_document(keypairs)))
            .await;
    }

    /// Publish `keypairs` with every response delayed by `delay`.
    pub async fn publish_with_delay(&self, keypairs: &[&TestKeypair], delay: Duration) {
        self.respond_with(
            ResponseTemplate::new(200)
                .set_body_json(jwks_document(keypairs))
                .set_delay(delay),
        )
        .await;
    }

    /// Answer key-set requests with `status` and an empty body.
    pub async fn fail_with_status(&self, status: u16) {
        self.respond_with(ResponseTemplate::new(status)).await;
    }

    /// Answer key-set requests with 200 and a body that is not a key set.
    pub async fn serve_malformed_document(&self) {
        self.respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_string("{\"not_keys\": true"),
        )
        .await;
    }

    /// Number of key-set requests received so far.
    pub async fn fetch_count(&self) -> usize {
        self.fetches_before_reset.load(Ordering::SeqCst) + self.journaled_fetches().await
    }

    async fn journaled_fetches(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| {
                requests
                    .iter()
                    .filter(|r| r.url.path() == JWKS_PATH)
                    .count()
            })
            .unwrap_or(0)
    }

    async fn respond_with(&self, response: ResponseTemplate) {
        // reset() also clears the request journal
        let journaled = self.journaled_fetches().await;
        self.fetches_before_reset.fetch_add(journaled, Ordering::SeqCst);
        self.server.reset().await;

        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }
}
