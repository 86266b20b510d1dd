/*
 * Responsibility
 * - GET /health (疎通用, unguarded)
 * - Reports how many stages guard the protected routes, so a half-configured deploy is visible
 */
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({"status": "ok", "stages": state.pipeline.len()})),
    )
}
