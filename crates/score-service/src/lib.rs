//! Score Service Library
//!
//! HTTP service for the Archy score API. Every protected request carries a
//! bearer token minted by the auth service; this crate verifies it against
//! the auth service's published key set before any handler runs.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware/auth.rs -> auth/jwt.rs -> auth/jwks.rs
//!                        |
//!                        v
//!                  handlers/*.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Key-set cache, token verification, claims
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP response mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Verification gate and HTTP metrics
//! - `models` - Response models
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
