//! Public endpoint integration tests.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use score_test_utils::{MockIssuer, TestKeypair, TestScoreServer, TestTokenBuilder};
use std::time::Duration;

async fn spawn_server() -> Result<(MockIssuer, TestScoreServer)> {
    let issuer = MockIssuer::start(&[&TestKeypair::new(1, "test-key-1")]).await;
    let server = TestScoreServer::spawn(&issuer.url()).await?;
    Ok((issuer, server))
}

#[tokio::test]
async fn test_root_greeting_is_public() -> Result<()> {
    let (_issuer, server) = spawn_server().await?;

    let response = reqwest::get(format!("{}/", server.url())).await?;

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await?, "Hello, Archy!");
    Ok(())
}

#[tokio::test]
async fn test_health_reports_fresh_key_set() -> Result<()> {
    let (_issuer, server) = spawn_server().await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["key_set"], "fresh");
    Ok(())
}

#[tokio::test]
async fn test_health_does_not_fetch() -> Result<()> {
    let keypair = TestKeypair::new(1, "test-key-1");
    let issuer = MockIssuer::start(&[&keypair]).await;
    let server =
        TestScoreServer::spawn_with_vars(&issuer.url(), &[("JWKS_REFRESH_INTERVAL_SECONDS", "1")])
            .await?;

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let body: serde_json::Value = reqwest::get(format!("{}/health", server.url()))
        .await?
        .json()
        .await?;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["key_set"], "stale");
    assert_eq!(issuer.fetch_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_is_public() -> Result<()> {
    let (_issuer, server) = spawn_server().await?;
    let client = reqwest::Client::new();

    // Generate some traffic first
    client
        .get(format!("{}/api/v1/me", server.url()))
        .send()
        .await?;

    let response = client.get(format!("{}/metrics", server.url())).send().await?;

    assert_eq!(response.status(), 200);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/plain"));
    Ok(())
}

#[tokio::test]
async fn test_unknown_path_is_not_found() -> Result<()> {
    let (_issuer, server) = spawn_server().await?;

    let response = reqwest::get(format!("{}/api/v1/unknown", server.url())).await?;

    assert_eq!(response.status(), 404);
    Ok(())
}

#[tokio::test]
async fn test_authenticated_request_with_public_routes_mixed() -> Result<()> {
    let keypair = TestKeypair::new(1, "test-key-1");
    let issuer = MockIssuer::start(&[&keypair]).await;
    let server = TestScoreServer::spawn(&issuer.url()).await?;
    let client = reqwest::Client::new();

    // A bearer token on a public route is simply ignored
    let token = keypair.sign(&TestTokenBuilder::new().for_user("user-42").build())?;
    let response = client
        .get(format!("{}/health", server.url()))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(response.status(), 200);

    let response = client
        .get(format!("{}/health", server.url()))
        .header("Authorization", "Token garbage")
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    Ok(())
}
