//! Verified token claims and the principal derived from them.
//!
//! The subject is a user identifier issued by the auth service and is
//! redacted in Debug output so it cannot end up in logs by accident.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Claims carried by a verified token.
///
/// Only the registered temporal claims and `sub`/`iss` are modelled; any
/// other claim the issuer adds is kept in `extra` untouched.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user identifier) - redacted in Debug output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Expiration timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Not-before timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Remaining claims, as issued.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("sub", &self.sub.as_ref().map(|_| "[REDACTED]"))
            .field("exp", &self.exp)
            .field("nbf", &self.nbf)
            .field("iat", &self.iat)
            .field("iss", &self.iss)
            .field("extra_claims", &self.extra.len())
            .finish()
    }
}

/// Outcome of a successful verification.
///
/// Lives for the duration of one request. `subject` is `None` when the token
/// carried no `sub` or an empty one: the caller is authenticated but
/// anonymous, and handlers that need an identity must reject it.
#[derive(Clone)]
pub struct Principal {
    /// Non-empty subject identifier, if the token named one.
    pub subject: Option<String>,

    /// All validated claims.
    pub claims: Claims,
}

impl Principal {
    /// Build a principal from verified claims.
    pub fn from_claims(claims: Claims) -> Self {
        let subject = claims.sub.clone().filter(|sub| !sub.is_empty());
        Self { subject, claims }
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("subject", &self.subject.as_ref().map(|_| "[REDACTED]"))
            .field("claims", &self.claims)
            .finish()
    }
}

/// Subject identifier published to downstream handlers.
///
/// Present in the request extensions only when authentication succeeded AND
/// the token named a subject. Its absence means the request must be treated
/// as unauthenticated.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthenticatedSubject(pub String);

impl AuthenticatedSubject {
    /// The subject identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthenticatedSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthenticatedSubject([REDACTED])")
    }
}
