//! Token verification stage.
//!
//! Reads the raw credential the transport put into the context, verifies it,
//! and stores the verified token and its claims before calling the next
//! stage. Any failure ends the request here.

use async_trait::async_trait;
use tracing::{Instrument, debug, info_span, warn};

use crate::context::RequestContext;
use crate::error::AuthError;
use crate::pipeline::{Interceptor, Next};
use crate::services::authn::{TokenVerifier, VerifiedToken};

#[derive(Debug, Clone)]
pub struct AuthnInterceptor {
    verifier: TokenVerifier,
}

impl AuthnInterceptor {
    pub fn new(verifier: TokenVerifier) -> Self {
        Self { verifier }
    }

    async fn parse(&self, ctx: &RequestContext) -> Result<VerifiedToken, AuthError> {
        // Checked before anything that could touch the network.
        let Some(raw_token) = ctx.raw_token() else {
            warn!("failed to extract JWT from context");
            return Err(AuthError::TokenContextMissing);
        };

        match self.verifier.verify(raw_token).await {
            Ok(token) => {
                debug!(sub = ?token.claims.subject(), kid = ?token.header.kid, "JWT verified");
                Ok(token)
            }
            Err(err) => {
                match &err {
                    AuthError::TokenMalformed => warn!("malformed JWT"),
                    AuthError::TokenExpired => warn!("expired JWT"),
                    AuthError::TokenNotActive => warn!("JWT not yet valid"),
                    AuthError::KeyResolution(inner) => warn!(error = %inner, "JWT key resolution failed"),
                    other => warn!(code = other.code(), "JWT validation failed"),
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl<Req, Resp> Interceptor<Req, Resp> for AuthnInterceptor
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async fn intercept(
        &self,
        mut ctx: RequestContext,
        req: Req,
        next: Next<'_, Req, Resp>,
    ) -> Result<Resp, AuthError> {
        let token = self.parse(&ctx).instrument(info_span!("parse_jwt")).await?;
        ctx.set_verified(token);

        next.run(ctx, req).await
    }
}
