mod common;

use std::collections::HashMap;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use endpoint_guard::app::{build_pipeline, build_router};
use endpoint_guard::config::Config;
use endpoint_guard::middleware::http::REQUEST_ID_HEADER;
use endpoint_guard::state::AppState;
use serde_json::{Value, json};
use tower::ServiceExt;

use common::{K1_PUBLIC, token};

const POLICY: &str = r#"
package http.authz

default allow := false

allow if {
    input.request.method == "GET"
    input.request.path == "/api/v1/whoami"
    input.claims.sub == "u1"
}
"#;

async fn app() -> Router {
    let vars: HashMap<&str, String> = HashMap::from([
        ("JWT_PUBLIC_KEY_PEM", K1_PUBLIC.to_string()),
        ("JWT_KEY_ID", "k1".to_string()),
        ("POLICY_MODE", "inprocess".to_string()),
        ("POLICY_MODULE", POLICY.to_string()),
        ("POLICY_QUERY", "data.http.authz.allow".to_string()),
    ]);
    let config = Config::from_lookup(|key| vars.get(key).cloned()).unwrap();

    let pipeline = build_pipeline(&config).await.unwrap();
    build_router(AppState::new(pipeline), &config)
}

fn bearer(sub: &str) -> String {
    let exp = chrono::Utc::now().timestamp() + 3600;
    format!("Bearer {}", token("k1", &json!({"sub": sub, "exp": exp})))
}

async fn get(app: Router, uri: &str, authorization: Option<String>) -> (StatusCode, Value) {
    let mut request = Request::builder().uri(uri);
    if let Some(value) = authorization {
        request = request.header(header::AUTHORIZATION, value);
    }

    let response = app.oneshot(request.body(Body::empty()).unwrap()).await.unwrap();
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_is_unguarded() {
    let (status, body) = get(app().await, "/api/v1/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "stages": 2}));
}

#[tokio::test]
async fn missing_bearer_is_unauthorized() {
    let (status, body) = get(app().await, "/api/v1/whoami", None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "TOKEN_MISSING");
}

#[tokio::test]
async fn garbage_bearer_is_unauthorized() {
    let (status, body) = get(app().await, "/api/v1/whoami", Some("Bearer nope".into())).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "TOKEN_MALFORMED");
}

#[tokio::test]
async fn policy_denial_is_forbidden() {
    let (status, body) = get(app().await, "/api/v1/whoami", Some(bearer("u2"))).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn allowed_caller_sees_claims_and_decision() {
    let (status, body) = get(app().await, "/api/v1/whoami", Some(bearer("u1"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subject"], "u1");
    assert_eq!(body["claims"]["sub"], "u1");
    assert_eq!(body["authorization"][0]["expressions"][0]["value"], true);
    assert_eq!(
        body["authorization"][0]["expressions"][0]["text"],
        "data.http.authz.allow"
    );
}
