//! Request-scoped credential store.
//!
//! One `RequestContext` is created per inbound call and moved down the
//! pipeline. Each slot has a single type, so a stage can never read a value of
//! the wrong shape.

use std::sync::Arc;

use crate::services::authn::{ClaimsShape, VerifiedToken};
use crate::services::authz::AuthorizationResult;

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    raw_token: Option<String>,
    token: Option<Arc<VerifiedToken>>,
    claims: Option<Arc<ClaimsShape>>,
    authorization: Option<Arc<AuthorizationResult>>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context as produced by a transport that found a bearer credential.
    pub fn with_raw_token(token: impl Into<String>) -> Self {
        Self {
            raw_token: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn raw_token(&self) -> Option<&str> {
        self.raw_token.as_deref()
    }

    pub fn set_raw_token(&mut self, token: impl Into<String>) {
        self.raw_token = Some(token.into());
    }

    pub fn token(&self) -> Option<&VerifiedToken> {
        self.token.as_deref()
    }

    pub fn claims(&self) -> Option<&ClaimsShape> {
        self.claims.as_deref()
    }

    /// Stores the verified token and, under its own slot, its claims.
    pub fn set_verified(&mut self, token: VerifiedToken) {
        self.claims = Some(Arc::clone(&token.claims));
        self.token = Some(Arc::new(token));
    }

    pub fn authorization(&self) -> Option<&AuthorizationResult> {
        self.authorization.as_deref()
    }

    pub fn set_authorization(&mut self, result: AuthorizationResult) {
        self.authorization = Some(Arc::new(result));
    }
}
