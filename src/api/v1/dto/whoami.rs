/*
 * Responsibility
 * - What a guarded route hands to the pipeline (GuardedRequest, also the policy input)
 * - What /whoami returns (WhoamiResponse)
 */
use serde::Serialize;
use serde_json::Value;

/// Request payload passed through the pipeline; serialized as policy input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardedRequest {
    pub method: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WhoamiResponse {
    pub subject: Option<String>,
    pub claims: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization: Option<Value>,
}
