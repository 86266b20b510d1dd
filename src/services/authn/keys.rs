//! Verification key lookup.
//!
//! The verifier never picks keys itself: it hands the decoded (still
//! untrusted) header to a `KeyResolver`, which usually selects by `kid`.

use std::collections::HashMap;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Header};
use thiserror::Error;

use crate::services::authn::jwks::JwksError;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("no verification key for kid '{0}'")]
    UnknownKeyId(String),
    #[error("token header carries no kid and no default key is configured")]
    MissingKeyId,
    #[error("invalid verification key: {0}")]
    InvalidKey(#[source] jsonwebtoken::errors::Error),
    #[error("key set refresh failed: {0}")]
    Refresh(#[source] JwksError),
}

/// Builds the decoding key for `method` from a PEM public key. HMAC methods
/// take the raw text as the shared secret.
pub fn decoding_key_from_pem(
    method: Algorithm,
    pem: &str,
) -> Result<DecodingKey, jsonwebtoken::errors::Error> {
    match method {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            Ok(DecodingKey::from_secret(pem.as_bytes()))
        }
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => DecodingKey::from_rsa_pem(pem.as_bytes()),
        Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(pem.as_bytes()),
        Algorithm::EdDSA => DecodingKey::from_ed_pem(pem.as_bytes()),
    }
}

#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn resolve(&self, header: &Header) -> Result<DecodingKey, KeyError>;
}

/// Fixed set of keys, known at startup.
#[derive(Clone, Default)]
pub struct StaticKeyResolver {
    keys: HashMap<String, DecodingKey>,
    default_key: Option<DecodingKey>,
}

impl std::fmt::Debug for StaticKeyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        f.debug_struct("StaticKeyResolver")
            .field("kids", &self.keys.keys().collect::<Vec<_>>())
            .field("has_default", &self.default_key.is_some())
            .finish()
    }
}

impl StaticKeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver that answers every token with the same key.
    pub fn single(key: DecodingKey) -> Self {
        Self {
            keys: HashMap::new(),
            default_key: Some(key),
        }
    }

    pub fn with_key(mut self, kid: impl Into<String>, key: DecodingKey) -> Self {
        self.keys.insert(kid.into(), key);
        self
    }

    pub fn with_default(mut self, key: DecodingKey) -> Self {
        self.default_key = Some(key);
        self
    }

    /// RSA public key (SPKI or PKCS#1 PEM) registered under `kid`.
    pub fn with_rsa_pem(self, kid: impl Into<String>, pem: &str) -> Result<Self, KeyError> {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(KeyError::InvalidKey)?;
        Ok(self.with_key(kid, key))
    }
}

#[async_trait]
impl KeyResolver for StaticKeyResolver {
    async fn resolve(&self, header: &Header) -> Result<DecodingKey, KeyError> {
        match header.kid.as_deref() {
            Some(kid) => self
                .keys
                .get(kid)
                .or(self.default_key.as_ref())
                .cloned()
                .ok_or_else(|| KeyError::UnknownKeyId(kid.to_string())),
            None => self.default_key.clone().ok_or(KeyError::MissingKeyId),
        }
    }
}
