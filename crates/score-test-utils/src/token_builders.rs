//! Builder patterns for test claims
//!
//! Provides a fluent API for the claim sets the auth service issues,
//! including the shapes it is allowed to omit (`exp`, `sub`).

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Builder for creating test JWT claims
///
/// Defaults to a subject of `"test-subject"`, `iat` of now and no `exp`.
///
/// # Example
/// ```rust,ignore
/// let claims = TestTokenBuilder::new()
///     .for_user("user-42")
///     .expires_in(3600)
///     .build();
/// ```
pub struct TestTokenBuilder {
    sub: Option<String>,
    exp: Option<i64>,
    nbf: Option<i64>,
    iat: Option<i64>,
    extra: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults
    pub fn new() -> Self {
        Self {
            sub: Some("test-subject".to_string()),
            exp: None,
            nbf: None,
            iat: Some(Utc::now().timestamp()),
            extra: Map::new(),
        }
    }

    /// Set the subject
    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = Some(subject.to_string());
        self
    }

    /// Omit the `sub` claim
    pub fn without_subject(mut self) -> Self {
        self.sub = None;
        self
    }

    /// Set expiration in seconds from now (negative for the past)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(mut self, seconds: i64) -> Self {
        self.nbf = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = Some(timestamp);
        self
    }

    /// Add an arbitrary claim
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.extra.insert(name.to_string(), value);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = self.extra;
        if let Some(sub) = self.sub {
            claims.insert("sub".to_string(), json!(sub));
        }
        if let Some(exp) = self.exp {
            claims.insert("exp".to_string(), json!(exp));
        }
        if let Some(nbf) = self.nbf {
            claims.insert("nbf".to_string(), json!(nbf));
        }
        if let Some(iat) = self.iat {
            claims.insert("iat".to_string(), json!(iat));
        }
        Value::Object(claims)
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_default_has_no_exp() {
        let claims = TestTokenBuilder::default().build();
        assert_eq!(claims["sub"], "test-subject");
        assert!(claims.get("exp").is_none());
        assert!(claims["iat"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_builder_sets_claims() {
        let claims = TestTokenBuilder::new()
            .for_user("user-42")
            .expires_in(3600)
            .not_before_in(-10)
            .with_claim("aud", json!("http://localhost:3000"))
            .build();

        assert_eq!(claims["sub"], "user-42");
        assert!(claims["exp"].as_i64().unwrap() > Utc::now().timestamp());
        assert!(claims["nbf"].as_i64().unwrap() < Utc::now().timestamp());
        assert_eq!(claims["aud"], "http://localhost:3000");
    }

    #[test]
    fn test_builder_without_subject() {
        let claims = TestTokenBuilder::new().without_subject().build();
        assert!(claims.get("sub").is_none());
    }
}
