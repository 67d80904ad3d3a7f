//! Score service error types.
//!
//! Every authentication failure is rendered to the client as the same
//! generic 401 response. The variant still matters: it drives the log level
//! and the `error_type` metric label, which is how "bad client" is told apart
//! from "auth service is down".

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Message returned to clients for every authentication failure.
pub const UNAUTHENTICATED_MESSAGE: &str = "Invalid or missing credential";

/// The key set could not be fetched or the issuer returned unusable data.
///
/// Infrastructure failure. Nothing is retried synchronously; the next call
/// that needs the key set attempts another fetch.
#[derive(Debug, Clone, Error)]
#[error("Key set unavailable: {0}")]
pub struct KeySetUnavailable(pub String);

/// Authentication failure raised by the verification gate.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No `Authorization` header on the request.
    #[error("Missing Authorization header")]
    MissingCredential,

    /// `Authorization` header present but not `Bearer <token>`.
    #[error("Invalid Authorization header format")]
    MalformedCredential,

    /// Signature, key lookup, structure or temporal claims failed.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The key set was needed but could not be obtained.
    #[error("Verification unavailable: {0}")]
    VerificationUnavailable(#[from] KeySetUnavailable),

    /// The request was authenticated but the token named no subject.
    #[error("Authenticated request carries no subject")]
    MissingSubject,
}

impl AuthError {
    /// Bounded label for metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing_credential",
            AuthError::MalformedCredential => "malformed_credential",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::VerificationUnavailable(_) => "verification_unavailable",
            AuthError::MissingSubject => "missing_subject",
        }
    }

    fn www_authenticate(&self) -> &'static str {
        match self {
            // RFC 6750 §3.1: no error code when the request lacked credentials
            AuthError::MissingCredential => "Bearer realm=\"archy-scores\"",
            _ => "Bearer realm=\"archy-scores\", error=\"invalid_token\"",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            AuthError::VerificationUnavailable(cause) => {
                tracing::warn!(
                    target: "scores.availability",
                    error = %cause,
                    "Rejecting request: key set unavailable"
                );
            }
            other => {
                tracing::debug!(
                    target: "scores.middleware.auth",
                    error = %other,
                    error_type = other.error_type(),
                    "Rejecting unauthenticated request"
                );
            }
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: "UNAUTHENTICATED",
                message: UNAUTHENTICATED_MESSAGE,
            },
        };

        let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static(self.www_authenticate()),
        );
        response
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn all_variants() -> Vec<AuthError> {
        vec![
            AuthError::MissingCredential,
            AuthError::MalformedCredential,
            AuthError::InvalidToken("signature mismatch".to_string()),
            AuthError::VerificationUnavailable(KeySetUnavailable(
                "connection refused".to_string(),
            )),
            AuthError::MissingSubject,
        ]
    }

    #[test]
    fn test_display() {
        assert_eq!(
            AuthError::MissingCredential.to_string(),
            "Missing Authorization header"
        );
        assert_eq!(
            AuthError::InvalidToken("expired".to_string()).to_string(),
            "Invalid token: expired"
        );
        assert_eq!(
            AuthError::from(KeySetUnavailable("timeout".to_string())).to_string(),
            "Verification unavailable: Key set unavailable: timeout"
        );
    }

    #[test]
    fn test_error_types_are_distinct() {
        let mut labels: Vec<&str> = all_variants().iter().map(AuthError::error_type).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), 5);
    }

    #[tokio::test]
    async fn test_every_variant_is_a_generic_401() {
        for error in all_variants() {
            let response = error.into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

            let body = read_body_json(response.into_body()).await;
            assert_eq!(body["error"]["code"], "UNAUTHENTICATED");
            assert_eq!(body["error"]["message"], UNAUTHENTICATED_MESSAGE);
        }
    }

    #[tokio::test]
    async fn test_internal_detail_is_not_leaked() {
        let response =
            AuthError::InvalidToken("InvalidSignature from crypto backend".to_string())
                .into_response();
        let body = read_body_json(response.into_body()).await;
        assert!(!body.to_string().contains("crypto backend"));
    }

    #[test]
    fn test_www_authenticate_omits_error_for_missing_credential() {
        let missing = AuthError::MissingCredential.into_response();
        let value = missing
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap();
        assert_eq!(value, "Bearer realm=\"archy-scores\"");

        let invalid = AuthError::MalformedCredential.into_response();
        let value = invalid
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(value.contains("error=\"invalid_token\""));
    }
}
