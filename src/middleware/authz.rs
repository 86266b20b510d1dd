//! Policy authorization stage.
//!
//! Turns the request into policy input, asks the configured `Authorizer`, and
//! only on an explicit allow records the result and calls the next stage.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{Instrument, debug, error, info, info_span};

use crate::context::RequestContext;
use crate::error::AuthError;
use crate::pipeline::{Interceptor, Next};
use crate::services::authz::{AuthorizationResult, Authorizer, PolicyLocation};

/// What the policy sees as `input`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyInput {
    /// The request payload as-is.
    #[default]
    Request,
    /// `{"request": <payload>, "claims": <verified claims or null>}`.
    RequestWithClaims,
}

impl PolicyInput {
    fn build<Req: Serialize>(self, ctx: &RequestContext, req: &Req) -> Result<Value, AuthError> {
        let request = serde_json::to_value(req).map_err(AuthError::PolicyInput)?;
        Ok(match self {
            PolicyInput::Request => request,
            PolicyInput::RequestWithClaims => json!({
                "request": request,
                "claims": ctx.claims().map(|c| c.to_value()),
            }),
        })
    }
}

#[derive(Clone)]
pub struct AuthzInterceptor {
    authorizer: Arc<dyn Authorizer>,
    input: PolicyInput,
}

impl std::fmt::Debug for AuthzInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthzInterceptor")
            .field("query", &self.authorizer.query())
            .field("location", &self.authorizer.location())
            .field("input", &self.input)
            .finish()
    }
}

impl AuthzInterceptor {
    pub fn new(authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            authorizer,
            input: PolicyInput::default(),
        }
    }

    pub fn with_input(mut self, input: PolicyInput) -> Self {
        self.input = input;
        self
    }

    async fn decide(&self, input: Value) -> Result<AuthorizationResult, AuthError> {
        let query = self.authorizer.query();

        let result = self.authorizer.authorize(&input).await.map_err(|err| {
            error!(error = %err, query = %query, "policy evaluation failed");
            err
        })?;

        if !result.allowed {
            info!(query = %query, "denied by policy");
            return Err(AuthError::PolicyDenied {
                query: query.to_string(),
            });
        }

        debug!(query = %query, "allowed by policy");
        Ok(result)
    }
}

#[async_trait]
impl<Req, Resp> Interceptor<Req, Resp> for AuthzInterceptor
where
    Req: Serialize + Send + 'static,
    Resp: Send + 'static,
{
    async fn intercept(
        &self,
        mut ctx: RequestContext,
        req: Req,
        next: Next<'_, Req, Resp>,
    ) -> Result<Resp, AuthError> {
        let input = self.input.build(&ctx, &req)?;

        let span = match self.authorizer.location() {
            PolicyLocation::InProcess => info_span!("authz_policy_internal"),
            PolicyLocation::Remote => info_span!("authz_policy_external"),
        };
        let result = self.decide(input).instrument(span).await?;
        ctx.set_authorization(result);

        next.run(ctx, req).await
    }
}
