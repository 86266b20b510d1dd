//! Outbound signing stage, for clients calling a guarded service.
//!
//! Signs the configured claims with the `kid` header set and places the token
//! in the context's raw-token slot, where a transport (or a verification stage
//! further down) picks it up.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::error;

use crate::context::RequestContext;
use crate::error::AuthError;
use crate::pipeline::{Interceptor, Next};
use crate::services::authn::Signer;

type ClaimsFn = dyn Fn() -> Value + Send + Sync;

#[derive(Clone)]
pub struct SigningInterceptor {
    signer: Signer,
    claims: Arc<ClaimsFn>,
}

impl std::fmt::Debug for SigningInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningInterceptor")
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

impl SigningInterceptor {
    /// Signs the same claims on every call.
    pub fn new(signer: Signer, claims: Value) -> Self {
        Self::with_claims_fn(signer, move || claims.clone())
    }

    /// Builds claims per call, e.g. to stamp a fresh `exp`.
    pub fn with_claims_fn(signer: Signer, claims: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self {
            signer,
            claims: Arc::new(claims),
        }
    }
}

#[async_trait]
impl<Req, Resp> Interceptor<Req, Resp> for SigningInterceptor
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
        let claims = (self.claims)();
        let token = self.signer.sign(&claims).map_err(|e| {
            error!(error = %e, kid = %self.signer.kid(), "failed to sign outbound JWT");
            AuthError::TokenSigning(e)
        })?;
        ctx.set_raw_token(token);

        next.run(ctx, req).await
    }
}
