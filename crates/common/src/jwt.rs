//! Pre-verification helpers for compact JWS tokens.
//!
//! Everything here runs BEFORE a signature is checked, so it only ever looks
//! at untrusted input to decide whether verification is worth attempting and
//! which key to attempt it with:
//!
//! - Size limit, applied before any decoding
//! - `kid` extraction from the protected header
//! - `iat` sanity check with clock skew tolerance
//! - base64url decoding of JWK key material
//!
//! # Security
//!
//! - Error messages are deliberately generic; detail is logged at debug level
//! - A `kid` obtained here is only a lookup key into a trusted key set
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{extract_kid, validate_iat, DEFAULT_CLOCK_SKEW};
//!
//! let kid = extract_kid(token)?;
//! let jwk = key_set.get(&kid).ok_or(...)?;
//! // ... verify signature with jwk ...
//! if let Some(iat) = claims.iat {
//!     validate_iat(iat, DEFAULT_CLOCK_SKEW)?;
//! }
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum accepted token size in bytes (8KB).
///
/// Tokens above this size are rejected before base64 decoding or any
/// cryptographic work. Tokens minted by the auth service are a few hundred
/// bytes, so this leaves ample headroom for additional claims.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default leeway applied to `exp`, `nbf` and `iat` checks.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(60);

/// Upper bound for a configured clock skew (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Reasons a token is rejected before signature verification.
///
/// All variants display the same text so that callers which forward the
/// message cannot leak which check failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Not three dot-separated segments, or the header is not base64url JSON.
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Header carries no usable `kid`.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// `iat` lies further in the future than the allowed clock skew.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Functions
// =============================================================================

/// Extract the `kid` (key ID) from a token header without verifying it.
///
/// The size limit is enforced first, then the token must consist of exactly
/// three segments and its first segment must decode to a JSON object holding
/// a non-empty string `kid`.
///
/// # Errors
///
/// - `TokenTooLarge` - token longer than [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - wrong segment count, bad base64url, or non-JSON header
/// - `MissingKid` - `kid` absent, empty, or not a string
pub fn extract_kid(token: &str) -> Result<String, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let mut segments = token.split('.');
    let (Some(header_segment), Some(_), Some(_), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        tracing::debug!(target: "common.jwt", "Token rejected: not a three-segment compact JWS");
        return Err(JwtValidationError::MalformedToken);
    };

    let header_bytes = URL_SAFE_NO_PAD.decode(header_segment).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode token header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse token header JSON");
        JwtValidationError::MalformedToken
    })?;

    header
        .get("kid")
        .and_then(serde_json::Value::as_str)
        .filter(|kid| !kid.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingKid)
}

/// Reject an `iat` (issued-at) claim too far in the future.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if `iat` is more than
/// `clock_skew` ahead of the current time.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    validate_iat_at(iat, clock_skew, chrono::Utc::now().timestamp())
}

/// [`validate_iat`] against an explicit `now`, for boundary tests.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    let clock_skew_secs = i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX);
    let max_iat = now.saturating_add(clock_skew_secs);

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

/// Decode a base64url (unpadded) JWK member such as `x`, `y`, `n` or `e`.
///
/// For an `OKP`/`Ed25519` key the decoded `x` is the raw 32-byte public key.
///
/// # Errors
///
/// Returns `base64::DecodeError` if the value is not valid unpadded base64url.
pub fn decode_jwk_member(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(value)
}

// =============================================================================
// Tests
// =============================================================================
