//! Key-set cache integration tests against a mocked auth service.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use futures::future::join_all;
use score_service::auth::jwks::DEFAULT_FETCH_TIMEOUT;
use score_service::auth::{
    HttpKeySetFetcher, KeySetCache, KeySetFetcher, KeySetStatus, TokenVerifier,
};
use score_service::errors::AuthError;
use score_service::middleware::authenticate;
use score_test_utils::{MockIssuer, TestKeypair, TestTokenBuilder};
use std::sync::Arc;
use std::time::Duration;

fn cache_for(issuer_url: &str, timeout: Duration, refresh_interval: Duration) -> KeySetCache {
    let fetcher: Arc<dyn KeySetFetcher> = Arc::new(HttpKeySetFetcher::new(issuer_url, timeout));
    KeySetCache::with_fetcher(fetcher, refresh_interval)
}

// =============================================================================
// initialize()
// =============================================================================

#[tokio::test]
async fn test_initialize_fetches_published_keys() -> Result<()> {
    let first = TestKeypair::new(1, "key-1");
    let second = TestKeypair::new(2, "key-2");
    let issuer = MockIssuer::start(&[&first, &second]).await;

    let cache = KeySetCache::new(&issuer.url());
    cache.initialize().await?;

    assert_eq!(cache.status().await, KeySetStatus::Fresh);
    let key_set = cache.get_current_key_set().await?;
    assert_eq!(key_set.len(), 2);
    assert!(key_set.get("key-1").is_some());
    assert!(key_set.get("key-2").is_some());
    assert_eq!(issuer.fetch_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_initialize_fails_on_error_status() {
    let issuer = MockIssuer::start_empty().await;
    issuer.fail_with_status(500).await;

    let cache = KeySetCache::new(&issuer.url());

    assert!(cache.initialize().await.is_err());
    assert_eq!(cache.status().await, KeySetStatus::Absent);
}

#[tokio::test]
async fn test_initialize_fails_on_not_found() {
    let issuer = MockIssuer::start_empty().await;

    let cache = KeySetCache::new(&issuer.url());
    assert!(cache.initialize().await.is_err());
}

#[tokio::test]
async fn test_initialize_fails_on_malformed_document() {
    let issuer = MockIssuer::start_empty().await;
    issuer.serve_malformed_document().await;

    let cache = KeySetCache::new(&issuer.url());

    assert!(cache.initialize().await.is_err());
    assert_eq!(cache.status().await, KeySetStatus::Absent);
}

#[tokio::test]
async fn test_initialize_fails_on_unreachable_issuer() {
    // Port 9 (discard) is not served on loopback in test environments
    let cache = cache_for(
        "http://127.0.0.1:9",
        Duration::from_secs(2),
        Duration::from_secs(900),
    );

    assert!(cache.initialize().await.is_err());
}

#[tokio::test]
async fn test_fetch_times_out() {
    let keypair = TestKeypair::new(1, "key-1");
    let issuer = MockIssuer::start_empty().await;
    issuer
        .publish_with_delay(&[&keypair], Duration::from_secs(3))
        .await;

    let cache = cache_for(&issuer.url(), Duration::from_millis(300), Duration::from_secs(900));

    let error = cache.initialize().await.unwrap_err();
    assert!(error.to_string().contains("request failed"));
}

#[tokio::test]
async fn test_issuer_url_trailing_slash_is_ignored() -> Result<()> {
    let keypair = TestKeypair::new(1, "key-1");
    let issuer = MockIssuer::start(&[&keypair]).await;

    let fetcher = HttpKeySetFetcher::new(&format!("{}/", issuer.url()), DEFAULT_FETCH_TIMEOUT);
    assert_eq!(
        fetcher.jwks_url(),
        format!("{}/api/auth/jwks", issuer.url())
    );

    let key_set = fetcher.fetch().await?;
    assert_eq!(key_set.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_empty_key_set_is_accepted() -> Result<()> {
    let issuer = MockIssuer::start(&[]).await;

    let cache = KeySetCache::new(&issuer.url());
    cache.initialize().await?;

    assert!(cache.get_current_key_set().await?.is_empty());
    Ok(())
}

// =============================================================================
// Refresh behaviour
// =============================================================================

#[tokio::test]
async fn test_fresh_entry_is_served_without_fetching() -> Result<()> {
    let keypair = TestKeypair::new(1, "key-1");
    let issuer = MockIssuer::start(&[&keypair]).await;

    let cache = KeySetCache::new(&issuer.url());
    cache.initialize().await?;

    for _ in 0..10 {
        cache.get_current_key_set().await?;
    }

    assert_eq!(issuer.fetch_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_failed_refresh_then_recovery() -> Result<()> {
    let keypair = TestKeypair::new(1, "key-1");
    let issuer = MockIssuer::start(&[&keypair]).await;

    let cache = cache_for(&issuer.url(), DEFAULT_FETCH_TIMEOUT, Duration::from_secs(1));
    cache.initialize().await?;

    issuer.fail_with_status(503).await;
    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert!(cache.get_current_key_set().await.is_err());
    // Previous entry kept but reported stale
    assert_eq!(cache.status().await, KeySetStatus::Stale);

    issuer.publish(&[&keypair]).await;
    let key_set = cache.get_current_key_set().await?;
    assert_eq!(key_set.len(), 1);
    assert_eq!(cache.status().await, KeySetStatus::Fresh);
    assert_eq!(issuer.fetch_count().await, 3);
    Ok(())
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cold_cache_authentications() -> Result<()> {
    let keypair = TestKeypair::new(1, "key-1");
    let issuer = MockIssuer::start_empty().await;
    issuer
        .publish_with_delay(&[&keypair], Duration::from_millis(200))
        .await;

    let cache = Arc::new(KeySetCache::new(&issuer.url()));
    let verifier = Arc::new(TokenVerifier::new(
        Arc::clone(&cache),
        Duration::from_secs(60),
    ));

    let token = keypair.sign(&TestTokenBuilder::new().for_user("user-42").build())?;
    let mut headers = axum::http::HeaderMap::new();
    headers.insert(
        axum::http::header::AUTHORIZATION,
        format!("Bearer {token}").parse()?,
    );
    let headers = Arc::new(headers);

    let tasks = (0..32).map(|_| {
        let verifier = Arc::clone(&verifier);
        let headers = Arc::clone(&headers);
        tokio::spawn(async move { authenticate(&verifier, &headers).await })
    });

    for result in join_all(tasks).await {
        let principal = result??;
        assert_eq!(principal.subject.as_deref(), Some("user-42"));
    }

    assert_eq!(issuer.fetch_count().await, 1);
    assert_eq!(cache.status().await, KeySetStatus::Fresh);
    assert_eq!(cache.get_current_key_set().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_unavailable_cold_cache_reports_verification_unavailable() -> Result<()> {
    let keypair = TestKeypair::new(1, "key-1");
    let issuer = MockIssuer::start_empty().await;

    let cache = Arc::new(KeySetCache::new(&issuer.url()));
    let verifier = TokenVerifier::new(cache, Duration::from_secs(60));

    let token = keypair.sign(&TestTokenBuilder::new().for_user("user-42").build())?;
    let result = verifier.verify(&token).await;

    assert!(matches!(result, Err(AuthError::VerificationUnavailable(_))));
    Ok(())
}
