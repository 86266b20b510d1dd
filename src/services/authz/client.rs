use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::error;
use url::Url;

#[derive(Debug, Error)]
pub enum PolicyClientError {
    #[error("invalid decision service url: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("decision service request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("decision service answered {0}")]
    Status(reqwest::StatusCode),
    #[error("failed to decode decision response: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("unexpected decision response shape: {0}")]
    Shape(#[source] serde_json::Error),
}

/// Remote decision service. Errors are infrastructure failures, never verdicts.
#[async_trait]
pub trait PolicyClient: Send + Sync {
    async fn query(&self, query: &str, input: &Value) -> Result<Value, PolicyClientError>;
}

/// Talks to an OPA-compatible data API: `POST <base>/v1/<query as path>`
/// with `{"input": ...}`.
#[derive(Debug, Clone)]
pub struct HttpPolicyClient {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpPolicyClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PolicyClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(PolicyClientError::Client)?;
        Self::with_client(base_url, http)
    }

    pub fn with_client(base_url: &str, http: reqwest::Client) -> Result<Self, PolicyClientError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `data.http.authz.allow` -> `<base>/v1/data/http/authz/allow`
    pub fn query_url(&self, query: &str) -> Result<Url, PolicyClientError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = query.replace('.', "/");
        Ok(Url::parse(&format!("{base}/v1/{path}"))?)
    }
}

#[async_trait]
impl PolicyClient for HttpPolicyClient {
    async fn query(&self, query: &str, input: &Value) -> Result<Value, PolicyClientError> {
        let url = self.query_url(query)?;

        let response = self
            .http
            .post(url)
            .json(&json!({ "input": input }))
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, query = %query, "failed to POST policy query");
                PolicyClientError::Transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(status = %status, query = %query, "decision service returned an error status");
            return Err(PolicyClientError::Status(status));
        }

        response.json::<Value>().await.map_err(|e| {
            error!(error = %e, query = %query, "failed to decode decision response");
            PolicyClientError::Decode(e)
        })
    }
}
