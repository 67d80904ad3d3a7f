//! Token authentication for the score service.
//!
//! - `jwks` - Cache of the auth service's published key set
//! - `jwt` - Token verification against that key set
//! - `claims` - Verified claims and the principal derived from them

pub mod claims;
pub mod jwks;
pub mod jwt;

pub use claims::{AuthenticatedSubject, Claims, Principal};
pub use jwks::{HttpKeySetFetcher, KeySet, KeySetCache, KeySetFetcher, KeySetStatus};
pub use jwt::TokenVerifier;
