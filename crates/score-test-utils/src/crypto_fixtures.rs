//! Deterministic cryptographic fixtures for testing
//!
//! Provides reproducible Ed25519 keypairs, their JWKS representation, and
//! token signing. The same seed always produces the same keypair.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde_json::json;
use thiserror::Error;

/// Test fixture error type
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),

    #[error("Token signing failed: {0}")]
    Signing(String),
}

/// Deterministic Ed25519 signing key with a key ID.
///
/// # Example
/// ```rust,ignore
/// let keypair = TestKeypair::new(1, "test-key-1");
/// let token = keypair.sign(&json!({"sub": "user-42"}))?;
/// let jwk = keypair.jwk_json();
/// ```
#[derive(Clone)]
pub struct TestKeypair {
    /// Key ID placed in token headers and the JWK.
    pub kid: String,

    /// Raw 32-byte public key.
    pub public_key: Vec<u8>,

    /// PKCS#8 v1 private key document.
    pub private_key_pkcs8: Vec<u8>,
}

impl TestKeypair {
    /// Create a keypair from a seed value (0-255).
    ///
    /// # Panics
    ///
    /// Panics if ring rejects the derived seed, which does not happen for
    /// 32-byte inputs.
    pub fn new(seed: u8, kid: &str) -> Self {
        let seed_bytes = seed_bytes(seed);
        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes)
            .map_err(|e| FixtureError::Crypto(format!("Failed to generate test keypair: {:?}", e)))
            .unwrap();

        Self {
            kid: kid.to_string(),
            public_key: key_pair.public_key().as_ref().to_vec(),
            private_key_pkcs8: build_pkcs8_from_seed(&seed_bytes),
        }
    }

    /// The public key as the JWK `x` member (base64url, unpadded).
    pub fn public_key_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.public_key)
    }

    /// The public key as a JWKS entry.
    pub fn jwk_json(&self) -> serde_json::Value {
        json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "kid": self.kid,
            "x": self.public_key_b64(),
            "alg": "EdDSA",
            "use": "sig"
        })
    }

    /// Sign `claims` as an EdDSA token with this key's `kid`.
    pub fn sign(&self, claims: &serde_json::Value) -> Result<String, FixtureError> {
        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.kid.clone());
        self.sign_with_header(&header, claims)
    }

    /// Sign `claims` with an explicit header, e.g. to put a different `kid`
    /// in front of this key's signature.
    pub fn sign_with_header(
        &self,
        header: &Header,
        claims: &serde_json::Value,
    ) -> Result<String, FixtureError> {
        let encoding_key = EncodingKey::from_ed_der(&self.private_key_pkcs8);
        encode(header, claims, &encoding_key).map_err(|e| FixtureError::Signing(e.to_string()))
    }
}

/// Build a JWKS document from keypairs.
pub fn jwks_document(keypairs: &[&TestKeypair]) -> serde_json::Value {
    let keys: Vec<serde_json::Value> = keypairs.iter().map(|k| k.jwk_json()).collect();
    json!({ "keys": keys })
}

fn seed_bytes(seed: u8) -> [u8; 32] {
    let mut seed_bytes = [0u8; 32];
    for (i, byte) in seed_bytes.iter_mut().enumerate() {
        let i = i as u8;
        *byte = seed.wrapping_mul(i.wrapping_add(1)).wrapping_add(i);
    }
    seed_bytes
}

/// Build PKCS#8 v1 document from Ed25519 seed
///
/// ring does not expose PKCS#8 for a seeded keypair, so it is assembled
/// here. Test-only.
pub fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    // SEQUENCE { INTEGER 0, SEQUENCE { OID 1.3.101.112 }, OCTET STRING { OCTET STRING seed } }
    let mut pkcs8 = Vec::with_capacity(48);
    pkcs8.extend_from_slice(&[0x30, 0x2e]);
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);
    pkcs8
}
