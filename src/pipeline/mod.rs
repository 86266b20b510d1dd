//! Interceptor composition.
//!
//! A `Pipeline` is an endpoint wrapped by an ordered list of interceptors.
//! `wrap` puts a stage outside everything added before it, so the stage
//! wrapped last runs first:
//!
//! ```ignore
//! let pipeline = Pipeline::new(endpoint)
//!     .wrap(authz)  // runs second
//!     .wrap(authn); // runs first
//! ```
//!
//! A stage either calls `next.run(ctx, req)` or returns an error, in which
//! case nothing behind it runs. Dropping the returned future cancels the whole
//! chain, including any in-flight I/O of the current stage.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::AuthError;

#[async_trait]
pub trait Endpoint<Req, Resp>: Send + Sync {
    async fn call(&self, ctx: RequestContext, req: Req) -> Result<Resp, AuthError>;
}

#[async_trait]
pub trait Interceptor<Req, Resp>: Send + Sync {
    async fn intercept(
        &self,
        ctx: RequestContext,
        req: Req,
        next: Next<'_, Req, Resp>,
    ) -> Result<Resp, AuthError>;
}

/// The rest of the chain, as seen from one stage.
pub struct Next<'a, Req, Resp> {
    chain: &'a [Arc<dyn Interceptor<Req, Resp>>],
    endpoint: &'a dyn Endpoint<Req, Resp>,
}

impl<Req, Resp> Next<'_, Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    pub async fn run(self, ctx: RequestContext, req: Req) -> Result<Resp, AuthError> {
        match self.chain.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    chain: rest,
                    endpoint: self.endpoint,
                };
                stage.intercept(ctx, req, next).await
            }
            None => self.endpoint.call(ctx, req).await,
        }
    }
}

pub struct Pipeline<Req, Resp> {
    // Outermost first.
    stages: Vec<Arc<dyn Interceptor<Req, Resp>>>,
    endpoint: Arc<dyn Endpoint<Req, Resp>>,
}

impl<Req, Resp> Clone for Pipeline<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            stages: self.stages.clone(),
            endpoint: Arc::clone(&self.endpoint),
        }
    }
}

impl<Req, Resp> std::fmt::Debug for Pipeline<Req, Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages.len())
            .finish_non_exhaustive()
    }
}

impl<Req, Resp> Pipeline<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    pub fn new(endpoint: impl Endpoint<Req, Resp> + 'static) -> Self {
        Self::from_arc(Arc::new(endpoint))
    }

    pub fn from_arc(endpoint: Arc<dyn Endpoint<Req, Resp>>) -> Self {
        Self {
            stages: Vec::new(),
            endpoint,
        }
    }

    /// Adds `stage` outside all stages added so far.
    pub fn wrap(self, stage: impl Interceptor<Req, Resp> + 'static) -> Self {
        self.wrap_arc(Arc::new(stage))
    }

    pub fn wrap_arc(mut self, stage: Arc<dyn Interceptor<Req, Resp>>) -> Self {
        self.stages.insert(0, stage);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub async fn call(&self, ctx: RequestContext, req: Req) -> Result<Resp, AuthError> {
        let next = Next {
            chain: &self.stages,
            endpoint: self.endpoint.as_ref(),
        };
        next.run(ctx, req).await
    }
}

#[async_trait]
impl<Req, Resp> Endpoint<Req, Resp> for Pipeline<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async fn call(&self, ctx: RequestContext, req: Req) -> Result<Resp, AuthError> {
        Pipeline::call(self, ctx, req).await
    }
}

/// Endpoint backed by an async closure.
pub struct FnEndpoint<F, Req, Resp> {
    f: F,
    _marker: PhantomData<fn(Req) -> Resp>,
}

pub fn endpoint_fn<F, Fut, Req, Resp>(f: F) -> FnEndpoint<F, Req, Resp>
where
    F: Fn(RequestContext, Req) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Resp, AuthError>> + Send,
{
    FnEndpoint {
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, Req, Resp> Endpoint<Req, Resp> for FnEndpoint<F, Req, Resp>
where
    F: Fn(RequestContext, Req) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Resp, AuthError>> + Send,
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async fn call(&self, ctx: RequestContext, req: Req) -> Result<Resp, AuthError> {
        (self.f)(ctx, req).await
    }
}
