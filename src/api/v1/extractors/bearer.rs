use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};

use crate::context::RequestContext;

/// Handler で RequestContext を受け取るための extractor.
///
/// `Authorization: Bearer <token>` があれば raw token を載せる。無い場合も
/// reject せず空の context を渡し、欠落は authn stage が TokenContextMissing として報告する。
pub struct BearerContext(pub RequestContext);

impl<S> FromRequestParts<S> for BearerContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token);

        Ok(BearerContext(match token {
            Some(token) => RequestContext::with_raw_token(token),
            None => RequestContext::new(),
        }))
    }
}

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
