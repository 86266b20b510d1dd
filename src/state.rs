/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - guard pipeline (authn → authz → whoami endpoint), built once at startup
 * - Clone 前提で持つ (内部は Arc/Clone cheap)
 */
use crate::api::v1::dto::whoami::{GuardedRequest, WhoamiResponse};
use crate::pipeline::Pipeline;

pub type GuardPipeline = Pipeline<GuardedRequest, WhoamiResponse>;

#[derive(Clone, Debug)]
pub struct AppState {
    pub pipeline: GuardPipeline,
}

impl AppState {
    pub fn new(pipeline: GuardPipeline) -> Self {
        Self { pipeline }
    }
}
