//! Token verification against the cached key set.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - The verification key is chosen by `kid`, and the token's `alg` must be
//!   the algorithm that key is published for
//! - `exp` and `nbf` are validated when present, with a configured leeway
//! - `iat` more than the leeway in the future is rejected
//! - Every failure maps to `AuthError::InvalidToken`; detail is only logged

use crate::auth::claims::{Claims, Principal};
use crate::auth::jwks::{Jwk, KeySet, KeySetCache};
use crate::errors::AuthError;
use common::jwt::{decode_jwk_member, extract_kid, validate_iat};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Verifies bearer tokens with keys from a [`KeySetCache`].
///
/// Holds no state of its own beyond the shared cache, so one instance is
/// shared by every request.
pub struct TokenVerifier {
    /// Cache of the issuer's public keys.
    key_set_cache: Arc<KeySetCache>,

    /// Leeway for temporal claims.
    clock_skew: Duration,
}

impl TokenVerifier {
    /// Create a verifier.
    ///
    /// # Arguments
    ///
    /// * `key_set_cache` - Shared key-set cache
    /// * `clock_skew` - Leeway applied to `exp`, `nbf` and `iat`
    pub fn new(key_set_cache: Arc<KeySetCache>, clock_skew: Duration) -> Self {
        Self {
            key_set_cache,
            clock_skew,
        }
    }

    /// Verify a raw token and return the authenticated principal.
    ///
    /// # Errors
    ///
    /// - `AuthError::VerificationUnavailable` if no current key set can be obtained
    /// - `AuthError::InvalidToken` for any structural, key, signature or claim failure
    #[instrument(skip_all, name = "scores.auth.verify")]
    pub async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let key_set = self.key_set_cache.get_current_key_set().await?;
        let claims = verify_with_key_set(token, &key_set, self.clock_skew)?;

        tracing::debug!(target: "scores.auth.jwt", has_subject = claims.sub.is_some(), "Token verified");
        Ok(Principal::from_claims(claims))
    }
}

fn invalid(reason: &str) -> AuthError {
    AuthError::InvalidToken(reason.to_string())
}

/// Verify `token` against a specific key set.
///
/// # Errors
///
/// Returns `AuthError::InvalidToken` on any failure.
pub fn verify_with_key_set(
    token: &str,
    key_set: &KeySet,
    clock_skew: Duration,
) -> Result<Claims, AuthError> {
    let kid = extract_kid(token).map_err(|e| {
        tracing::debug!(target: "scores.auth.jwt", error = ?e, "Token kid extraction failed");
        invalid("malformed token")
    })?;

    let jwk = key_set.get(&kid).ok_or_else(|| {
        tracing::debug!(target: "scores.auth.jwt", kid = %kid, "Token signed with unknown key");
        invalid("unknown signing key")
    })?;

    let claims = verify_token(token, jwk, clock_skew)?;

    if let Some(iat) = claims.iat {
        validate_iat(iat, clock_skew).map_err(|e| {
            tracing::debug!(target: "scores.auth.jwt", error = ?e, "Token iat validation failed");
            invalid("issued in the future")
        })?;
    }

    Ok(claims)
}

/// Verify the signature with `jwk` and validate temporal claims.
fn verify_token(token: &str, jwk: &Jwk, clock_skew: Duration) -> Result<Claims, AuthError> {
    let (decoding_key, algorithm) = decoding_key(jwk)?;

    let mut validation = Validation::new(algorithm);
    validation.leeway = clock_skew.as_secs();
    validation.validate_exp = true;
    validation.validate_nbf = true;
    // No audience policy; tokens from the auth service may carry one
    validation.validate_aud = false;
    // exp is validated when present but not required
    validation.required_spec_claims.clear();

    let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!(target: "scores.auth.jwt", kid = %jwk.kid, error = %e, "Token verification failed");
        invalid("verification failed")
    })?;

    Ok(token_data.claims)
}

/// Build the decoding key for `jwk` and pick the algorithm it verifies.
fn decoding_key(jwk: &Jwk) -> Result<(DecodingKey, Algorithm), AuthError> {
    if let Some(key_use) = jwk.key_use.as_deref() {
        if key_use != "sig" {
            tracing::warn!(target: "scores.auth.jwt", kid = %jwk.kid, key_use = %key_use, "Key is not a signing key");
            return Err(invalid("unusable key"));
        }
    }

    let declared = jwk
        .alg
        .as_deref()
        .map(|alg| {
            Algorithm::from_str(alg).map_err(|_| {
                tracing::warn!(target: "scores.auth.jwt", kid = %jwk.kid, alg = %alg, "Unsupported JWK algorithm");
                invalid("unusable key")
            })
        })
        .transpose()?;

    match jwk.kty.as_str() {
        "OKP" => {
            if jwk.crv.as_deref().is_some_and(|crv| crv != "Ed25519") {
                tracing::warn!(target: "scores.auth.jwt", kid = %jwk.kid, crv = ?jwk.crv, "Unsupported OKP curve");
                return Err(invalid("unusable key"));
            }
            let algorithm = expect_algorithm(jwk, declared, &[Algorithm::EdDSA], Algorithm::EdDSA)?;

            let x = required_member(jwk, "x", jwk.x.as_deref())?;
            let public_key = decode_jwk_member(x).map_err(|e| {
                tracing::warn!(target: "scores.auth.jwt", kid = %jwk.kid, error = %e, "Invalid public key encoding");
                invalid("unusable key")
            })?;

            Ok((DecodingKey::from_ed_der(&public_key), algorithm))
        }
        "RSA" => {
            let algorithm = expect_algorithm(
                jwk,
                declared,
                &[
                    Algorithm::RS256,
                    Algorithm::RS384,
                    Algorithm::RS512,
                    Algorithm::PS256,
                    Algorithm::PS384,
                    Algorithm::PS512,
                ],
                Algorithm::RS256,
            )?;
            let n = required_member(jwk, "n", jwk.n.as_deref())?;
            let e = required_member(jwk, "e", jwk.e.as_deref())?;

            let key = DecodingKey::from_rsa_components(n, e).map_err(|err| {
                tracing::warn!(target: "scores.auth.jwt", kid = %jwk.kid, error = %err, "Invalid RSA key components");
                invalid("unusable key")
            })?;
            Ok((key, algorithm))
        }
        "EC" => {
            let curve_algorithm = match jwk.crv.as_deref() {
                Some("P-256") => Algorithm::ES256,
                Some("P-384") => Algorithm::ES384,
                other => {
                    tracing::warn!(target: "scores.auth.jwt", kid = %jwk.kid, crv = ?other, "Unsupported EC curve");
                    return Err(invalid("unusable key"));
                }
            };
            let algorithm = expect_algorithm(jwk, declared, &[curve_algorithm], curve_algorithm)?;
            let x = required_member(jwk, "x", jwk.x.as_deref())?;
            let y = required_member(jwk, "y", jwk.y.as_deref())?;

            let key = DecodingKey::from_ec_components(x, y).map_err(|err| {
                tracing::warn!(target: "scores.auth.jwt", kid = %jwk.kid, error = %err, "Invalid EC key components");
                invalid("unusable key")
            })?;
            Ok((key, algorithm))
        }
        other => {
            tracing::warn!(target: "scores.auth.jwt", kid = %jwk.kid, kty = %other, "Unsupported JWK key type");
            Err(invalid("unusable key"))
        }
    }
}

fn expect_algorithm(
    jwk: &Jwk,
    declared: Option<Algorithm>,
    allowed: &[Algorithm],
    default: Algorithm,
) -> Result<Algorithm, AuthError> {
    match declared {
        None => Ok(default),
        Some(algorithm) if allowed.contains(&algorithm) => Ok(algorithm),
        Some(algorithm) => {
            tracing::warn!(
                target: "scores.auth.jwt",
                kid = %jwk.kid,
                kty = %jwk.kty,
                alg = ?algorithm,
                "JWK algorithm does not match key type"
            );
            Err(invalid("unusable key"))
        }
    }
}

fn required_member<'a>(
    jwk: &Jwk,
    name: &'static str,
    value: Option<&'a str>,
) -> Result<&'a str, AuthError> {
    value.ok_or_else(|| {
        tracing::warn!(target: "scores.auth.jwt", kid = %jwk.kid, member = name, "JWK missing key material");
        invalid("unusable key")
    })
}
