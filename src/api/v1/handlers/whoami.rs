/*
 * Responsibility
 * - GET /whoami: runs the guard pipeline, then echoes what it learned about the caller
 * - whoami_endpoint is the pipeline's terminal endpoint (never sees HTTP types)
 */
use axum::{
    Json,
    extract::{OriginalUri, State},
    http::Method,
};

use crate::api::v1::dto::whoami::{GuardedRequest, WhoamiResponse};
use crate::api::v1::extractors::BearerContext;
use crate::context::RequestContext;
use crate::error::AuthError;
use crate::state::AppState;

pub async fn whoami(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    BearerContext(ctx): BearerContext,
) -> Result<Json<WhoamiResponse>, AuthError> {
    let req = GuardedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
    };

    let res = state.pipeline.call(ctx, req).await?;
    Ok(Json(res))
}

pub async fn whoami_endpoint(
    ctx: RequestContext,
    _req: GuardedRequest,
) -> Result<WhoamiResponse, AuthError> {
    let claims = ctx.claims();

    Ok(WhoamiResponse {
        subject: claims.and_then(|c| c.subject()).map(str::to_string),
        claims: claims.map(|c| c.to_value()).unwrap_or_default(),
        authorization: ctx.authorization().map(|r| r.payload.clone()),
    })
}
