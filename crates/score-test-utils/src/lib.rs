//! # Score Test Utilities
//!
//! Shared test utilities for the score service.
//!
//! This crate provides:
//! - Deterministic Ed25519 signing keys and JWKS entries (`TestKeypair`)
//! - Claim builders (`TestTokenBuilder`)
//! - A mock auth service publishing a key set (`MockIssuer`)
//! - Server test harness (`TestScoreServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use score_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let keypair = TestKeypair::new(1, "test-key-1");
//!     let issuer = MockIssuer::start(&[&keypair]).await;
//!     let server = TestScoreServer::spawn(&issuer.url()).await?;
//!
//!     let token = keypair.sign(&TestTokenBuilder::new().for_user("user-42").build())?;
//!     let response = reqwest::Client::new()
//!         .get(format!("{}/api/v1/me", server.url()))
//!         .bearer_auth(token)
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod mock_issuer;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use mock_issuer::*;
pub use server_harness::*;
pub use token_builders::*;
