//! Token verification and issuance.

pub mod claims;
pub mod jwks;
pub mod keys;
pub mod signer;
pub mod verifier;

pub use claims::{Audience, ClaimsKind, ClaimsShape, RegisteredClaims};
pub use jwks::JwksKeyResolver;
pub use keys::{KeyResolver, StaticKeyResolver};
pub use signer::Signer;
pub use verifier::{TokenVerifier, VerifiedToken};
