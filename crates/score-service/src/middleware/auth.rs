//! Authentication middleware for protected routes.
//!
//! Extracts the Bearer token from the Authorization header, verifies it with
//! the [`TokenVerifier`], and publishes the result in request extensions:
//!
//! - [`Principal`] for every successfully authenticated request
//! - [`AuthenticatedSubject`] only when the token named a subject
//!
//! Handlers that need an identity take `AuthenticatedSubject` as an
//! extractor; it rejects with 401 when the extension is absent.

use crate::auth::{AuthenticatedSubject, Principal, TokenVerifier};
use crate::errors::AuthError;
use crate::observability::metrics;
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::instrument;

/// Scheme prefix of an accepted Authorization header. Case-sensitive.
const BEARER_PREFIX: &str = "Bearer ";

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    /// Token verifier backed by the shared key-set cache.
    pub token_verifier: Arc<TokenVerifier>,
}

/// Extract the raw token from an `Authorization: Bearer <token>` header.
///
/// The remainder after the prefix is returned as-is, including the empty
/// string; rejecting it is left to verification.
///
/// # Errors
///
/// - `AuthError::MissingCredential` if there is no Authorization header
/// - `AuthError::MalformedCredential` if it is not visible ASCII or does not
///   start with exactly `"Bearer "`
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingCredential)?;

    let auth_header = auth_header
        .to_str()
        .map_err(|_| AuthError::MalformedCredential)?;

    auth_header
        .strip_prefix(BEARER_PREFIX)
        .ok_or(AuthError::MalformedCredential)
}

/// Authenticate a request from its headers.
///
/// # Errors
///
/// - `MissingCredential` / `MalformedCredential` from header parsing
/// - `VerificationUnavailable` if no current key set can be obtained
/// - `InvalidToken` if the token fails verification
pub async fn authenticate(
    token_verifier: &TokenVerifier,
    headers: &HeaderMap,
) -> Result<Principal, AuthError> {
    let token = extract_bearer_token(headers)?;
    token_verifier.verify(token).await
}

/// Authentication middleware.
///
/// # Authorization Header Format
///
/// ```text
/// Authorization: Bearer <token>
/// ```
///
/// # Response
///
/// - Returns 401 Unauthorized with a WWW-Authenticate header if the request
///   cannot be authenticated
/// - Otherwise continues to the next handler with the principal in extensions
#[instrument(skip_all, name = "scores.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let principal = match authenticate(&state.token_verifier, req.headers()).await {
        Ok(principal) => principal,
        Err(e) => {
            metrics::record_auth_result("failure", Some(e.error_type()));
            return Err(e);
        }
    };

    metrics::record_auth_result("success", None);
    tracing::debug!(
        target: "scores.middleware.auth",
        has_subject = principal.subject.is_some(),
        "Request authenticated"
    );

    if let Some(subject) = principal.subject.clone() {
        req.extensions_mut().insert(AuthenticatedSubject(subject));
    }
    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedSubject
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedSubject>()
            .cloned()
            .ok_or(AuthError::MissingSubject)
    }
}
