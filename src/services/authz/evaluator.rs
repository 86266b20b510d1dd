//! Authorization strategies.
//!
//! Both answer the same question for a request payload and both fail closed:
//! only an explicit `true` verdict allows. In-process evaluation failures
//! surface as `PolicyEvaluation`, remote failures as `Upstream`; neither is
//! ever reported as a denial.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AuthError;
use crate::services::authz::client::{PolicyClient, PolicyClientError};
use crate::services::policy::{self, PolicyError, PreparedQuery};

/// Verdict plus the engine-specific payload it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorizationResult {
    pub allowed: bool,
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyLocation {
    InProcess,
    Remote,
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Query expression, for logs and denial errors.
    fn query(&self) -> &str;

    fn location(&self) -> PolicyLocation;

    async fn authorize(&self, input: &Value) -> Result<AuthorizationResult, AuthError>;
}

/// Evaluates a module compiled at construction.
#[derive(Debug, Clone)]
pub struct InProcessAuthorizer {
    prepared: PreparedQuery,
}

impl InProcessAuthorizer {
    /// Fails if the module does not compile or the query does not resolve.
    pub fn new(module: &str, query: &str) -> Result<Self, PolicyError> {
        Ok(Self::from_prepared(policy::prepare(module, query)?))
    }

    pub fn from_prepared(prepared: PreparedQuery) -> Self {
        Self { prepared }
    }
}

#[async_trait]
impl Authorizer for InProcessAuthorizer {
    fn query(&self) -> &str {
        self.prepared.text()
    }

    fn location(&self) -> PolicyLocation {
        PolicyLocation::InProcess
    }

    async fn authorize(&self, input: &Value) -> Result<AuthorizationResult, AuthError> {
        let results = self
            .prepared
            .eval(input)
            .map_err(AuthError::PolicyEvaluation)?;

        Ok(AuthorizationResult {
            allowed: results.allowed(),
            payload: results.to_payload(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct DecisionResponse {
    result: bool,
}

/// Delegates to a decision service. Nothing is checked at construction.
#[derive(Clone)]
pub struct RemoteAuthorizer {
    query: String,
    client: Arc<dyn PolicyClient>,
}

impl std::fmt::Debug for RemoteAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteAuthorizer")
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}

impl RemoteAuthorizer {
    pub fn new(query: impl Into<String>, client: Arc<dyn PolicyClient>) -> Self {
        Self {
            query: query.into(),
            client,
        }
    }
}

#[async_trait]
impl Authorizer for RemoteAuthorizer {
    fn query(&self) -> &str {
        &self.query
    }

    fn location(&self) -> PolicyLocation {
        PolicyLocation::Remote
    }

    async fn authorize(&self, input: &Value) -> Result<AuthorizationResult, AuthError> {
        let response = self.client.query(&self.query, input).await?;

        // `result` must be present and boolean; anything else is a broken
        // decision service rather than a deny.
        let decision = DecisionResponse::deserialize(&response).map_err(PolicyClientError::Shape)?;

        Ok(AuthorizationResult {
            allowed: decision.result,
            payload: response,
        })
    }
}
