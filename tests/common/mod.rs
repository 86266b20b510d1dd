#![allow(dead_code)]

use std::sync::Arc;

use endpoint_guard::context::RequestContext;
use endpoint_guard::error::AuthError;
use endpoint_guard::pipeline::{Endpoint, endpoint_fn};
use endpoint_guard::services::authn::keys::decoding_key_from_pem;
use endpoint_guard::services::authn::{Signer, StaticKeyResolver};
use jsonwebtoken::Algorithm;
use serde_json::Value;

pub const K1_PRIVATE: &str = include_str!("../fixtures/k1_private.pem");
pub const K1_PUBLIC: &str = include_str!("../fixtures/k1_public.pem");
pub const K2_PRIVATE: &str = include_str!("../fixtures/k2_private.pem");
pub const K2_PUBLIC: &str = include_str!("../fixtures/k2_public.pem");
pub const JWKS: &str = include_str!("../fixtures/jwks.json");

pub const NOW: i64 = 1_700_000_000;

pub fn signer(kid: &str) -> Signer {
    let pem = match kid {
        "k2" => K2_PRIVATE,
        _ => K1_PRIVATE,
    };
    Signer::from_pem(kid, pem, Algorithm::RS256).unwrap()
}

pub fn token(kid: &str, claims: &Value) -> String {
    signer(kid).sign(claims).unwrap()
}

/// k1 and k2 under their kids, RS256.
pub fn static_keys() -> StaticKeyResolver {
    StaticKeyResolver::new()
        .with_key("k1", decoding_key_from_pem(Algorithm::RS256, K1_PUBLIC).unwrap())
        .with_key("k2", decoding_key_from_pem(Algorithm::RS256, K2_PUBLIC).unwrap())
}

/// Endpoint that echoes the verified claims and counts its invocations.
pub fn claims_endpoint(
    calls: Arc<std::sync::atomic::AtomicUsize>,
) -> impl Endpoint<Value, Value> + 'static {
    endpoint_fn(move |ctx: RequestContext, _req: Value| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok::<_, AuthError>(ctx.claims().map(|c| c.to_value()).unwrap_or(Value::Null))
        }
    })
}
