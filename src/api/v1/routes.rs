/*
 * Responsibility
 * - v1 の URL 構造を定義
 * - /health は素通し, /whoami は guard pipeline を通す
 */
use axum::{Router, routing::get};

use crate::api::v1::handlers::{health::health, whoami::whoami};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/whoami", get(whoami))
}
