//! Utilities shared between the score service and its test tooling.

#![warn(clippy::pedantic)]

/// Token pre-verification helpers (size limits, `kid` extraction, `iat` checks)
pub mod jwt;
