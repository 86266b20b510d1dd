use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("invalid signing key: {0}")]
    InvalidKey(#[source] jsonwebtoken::errors::Error),
    #[error("failed to sign JWT: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Issues compact JWS tokens carrying a `kid` header, so verifiers holding
/// several keys can pick the right one directly.
#[derive(Clone)]
pub struct Signer {
    kid: String,
    method: Algorithm,
    encoding_key: EncodingKey,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        f.debug_struct("Signer")
            .field("kid", &self.kid)
            .field("method", &self.method)
            .finish()
    }
}

impl Signer {
    pub fn new(kid: impl Into<String>, encoding_key: EncodingKey, method: Algorithm) -> Self {
        Self {
            kid: kid.into(),
            method,
            encoding_key,
        }
    }

    /// `private_key_pem` is an RSA private key, PKCS#1 or PKCS#8.
    pub fn from_rsa_pem(
        kid: impl Into<String>,
        private_key_pem: &str,
        method: Algorithm,
    ) -> Result<Self, SignError> {
        let encoding_key =
            EncodingKey::from_rsa_pem(private_key_pem.as_bytes()).map_err(SignError::InvalidKey)?;
        Ok(Self::new(kid, encoding_key, method))
    }

    /// Private key in PEM for any method family; HMAC methods take the raw
    /// text as the shared secret.
    pub fn from_pem(
        kid: impl Into<String>,
        private_key_pem: &str,
        method: Algorithm,
    ) -> Result<Self, SignError> {
        let pem = private_key_pem.as_bytes();
        let encoding_key = match method {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                Ok(EncodingKey::from_secret(pem))
            }
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => EncodingKey::from_rsa_pem(pem),
            Algorithm::ES256 | Algorithm::ES384 => EncodingKey::from_ec_pem(pem),
            Algorithm::EdDSA => EncodingKey::from_ed_pem(pem),
        }
        .map_err(SignError::InvalidKey)?;
        Ok(Self::new(kid, encoding_key, method))
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn method(&self) -> Algorithm {
        self.method
    }

    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, SignError> {
        sign(&self.kid, &self.encoding_key, self.method, claims)
    }
}

/// Signs `claims` with `key`, embedding `kid` in the header. The output
/// depends only on the arguments.
pub fn sign<T: Serialize>(
    kid: &str,
    key: &EncodingKey,
    method: Algorithm,
    claims: &T,
) -> Result<String, SignError> {
    let mut header = Header::new(method);
    header.kid = Some(kid.to_string());

    jsonwebtoken::encode(&header, claims, key).map_err(|e| {
        error!(error = %e, kid = %kid, "failed to sign JWT");
        SignError::Signing(e)
    })
}
