/*
 * Responsibility
 * - Per-request failure taxonomy shared by every pipeline stage (AuthError)
 * - Construction-time failures (SetupError), kept apart so only the binary decides to abort
 * - IntoResponse: token failures -> 401, denial -> 403, upstream / key source -> 502, the rest -> 500
 */
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::services::authn::jwks::JwksError;
use crate::services::authn::keys::KeyError;
use crate::services::authn::signer::SignError;
use crate::services::authz::client::PolicyClientError;
use crate::services::policy::PolicyError;

#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential was placed into the context by the transport.
    #[error("JWT not present")]
    TokenContextMissing,

    #[error("JWT is malformed")]
    TokenMalformed,

    #[error("unexpected signing method")]
    UnexpectedSigningMethod,

    /// `exp` has passed.
    #[error("JWT is expired")]
    TokenExpired,

    /// `nbf` is in the future.
    #[error("token is not valid yet")]
    TokenNotActive,

    #[error("JWT was invalid")]
    TokenInvalid,

    /// The key resolver failed; the inner error is surfaced as-is.
    #[error(transparent)]
    KeyResolution(#[from] KeyError),

    #[error("denied by policy")]
    PolicyDenied { query: String },

    #[error("policy evaluation failed: {0}")]
    PolicyEvaluation(#[source] PolicyError),

    /// The request could not be turned into policy input.
    #[error("failed to encode policy input: {0}")]
    PolicyInput(#[source] serde_json::Error),

    #[error(transparent)]
    Upstream(#[from] PolicyClientError),

    /// Outbound token could not be signed.
    #[error("failed to sign outbound JWT: {0}")]
    TokenSigning(#[source] SignError),

    #[error("endpoint failed: {0}")]
    Endpoint(#[source] anyhow::Error),
}

impl AuthError {
    /// Stable machine-readable code (logs and response bodies).
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::TokenContextMissing => "TOKEN_MISSING",
            AuthError::TokenMalformed => "TOKEN_MALFORMED",
            AuthError::UnexpectedSigningMethod => "UNEXPECTED_SIGNING_METHOD",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::TokenNotActive => "TOKEN_NOT_ACTIVE",
            AuthError::TokenInvalid => "TOKEN_INVALID",
            AuthError::KeyResolution(KeyError::Refresh(_)) => "KEY_SOURCE_UNAVAILABLE",
            AuthError::KeyResolution(_) => "KEY_RESOLUTION_FAILED",
            AuthError::PolicyDenied { .. } => "FORBIDDEN",
            AuthError::PolicyEvaluation(_) => "POLICY_EVALUATION_FAILED",
            AuthError::PolicyInput(_) => "POLICY_INPUT_INVALID",
            AuthError::Upstream(_) => "BAD_GATEWAY",
            AuthError::TokenSigning(_) => "TOKEN_SIGNING_FAILED",
            AuthError::Endpoint(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            // The key set endpoint being down says nothing about the token.
            AuthError::KeyResolution(KeyError::Refresh(_)) => StatusCode::BAD_GATEWAY,
            AuthError::TokenContextMissing
            | AuthError::TokenMalformed
            | AuthError::UnexpectedSigningMethod
            | AuthError::TokenExpired
            | AuthError::TokenNotActive
            | AuthError::TokenInvalid
            | AuthError::KeyResolution(_) => StatusCode::UNAUTHORIZED,
            AuthError::PolicyDenied { .. } => StatusCode::FORBIDDEN,
            AuthError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AuthError::PolicyEvaluation(_)
            | AuthError::PolicyInput(_)
            | AuthError::TokenSigning(_)
            | AuthError::Endpoint(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// A verdict, as opposed to a failure to reach one.
    pub fn is_denial(&self) -> bool {
        matches!(self, AuthError::PolicyDenied { .. })
    }
}

#[derive(Serialize)]
struct ErrorResponseBody {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal details stay in the logs.
        let message = match &self {
            AuthError::KeyResolution(KeyError::Refresh(_)) => {
                "signing keys unavailable".to_string()
            }
            AuthError::KeyResolution(_) => "JWT could not be verified".to_string(),
            AuthError::PolicyEvaluation(_) => "policy evaluation failed".to_string(),
            AuthError::Upstream(_) => "policy decision service unavailable".to_string(),
            AuthError::PolicyInput(_) | AuthError::TokenSigning(_) | AuthError::Endpoint(_) => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponseBody {
            error: ErrorBody {
                code: self.code(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Failures while assembling the pipeline. None of these are retried.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("key discovery failed: {0}")]
    KeyDiscovery(#[from] JwksError),

    #[error("failed to prepare authorization policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("invalid verification key: {0}")]
    VerificationKey(#[source] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Signing(#[from] SignError),

    #[error("failed to set up policy client: {0}")]
    PolicyClient(#[source] PolicyClientError),
}
