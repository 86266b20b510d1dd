//! Token verification with precise failure classification.
//!
//! Checks run in a fixed order and the first failure wins:
//! malformed > unexpected signing method > expired > not yet valid >
//! generic invalid (iss, aud) > key resolver error > generic invalid
//! (signature). The key resolver is consulted only for tokens whose method,
//! time claims, issuer and audience already passed, so a stale or foreign
//! token never triggers a key refresh.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::AuthError;
use crate::services::authn::claims::{ClaimsKind, ClaimsShape};
use crate::services::authn::keys::KeyResolver;

/// A token whose signature and time claims were checked.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub header: Header,
    pub claims: Arc<ClaimsShape>,
    /// Always true for tokens handed out by the verifier.
    pub valid: bool,
}

/// Unix seconds source; swapped out in tests.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

#[derive(Clone)]
pub struct TokenVerifier {
    method: Algorithm,
    claims: ClaimsKind,
    keys: Arc<dyn KeyResolver>,
    validation: Validation,
    issuer: Option<String>,
    audience: Option<String>,
    leeway: i64,
    clock: Clock,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("method", &self.method)
            .field("claims", &self.claims)
            .field("leeway", &self.leeway)
            .field("iss", &self.issuer)
            .field("aud", &self.audience)
            .finish()
    }
}

impl TokenVerifier {
    pub fn new(method: Algorithm, claims: ClaimsKind, keys: Arc<dyn KeyResolver>) -> Self {
        Self {
            method,
            claims,
            keys,
            validation: signature_validation(method),
            issuer: None,
            audience: None,
            leeway: 0,
            clock: Arc::new(|| chrono::Utc::now().timestamp()),
        }
    }

    /// Require `iss` to be present and equal to `issuer`.
    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.issuer = Some(issuer.to_string());
        self
    }

    /// Require `aud` to be present and to contain `audience`.
    pub fn with_audience(mut self, audience: &str) -> Self {
        self.audience = Some(audience.to_string());
        self
    }

    /// Clock-skew allowance applied to `exp` and `nbf`.
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway = i64::try_from(seconds).unwrap_or(i64::MAX);
        self
    }

    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn expected_method(&self) -> Algorithm {
        self.method
    }

    pub fn claims_kind(&self) -> ClaimsKind {
        self.claims
    }

    pub async fn verify(&self, raw_token: &str) -> Result<VerifiedToken, AuthError> {
        self.verify_at(raw_token, (self.clock)()).await
    }

    pub async fn verify_at(&self, raw_token: &str, now: i64) -> Result<VerifiedToken, AuthError> {
        let checks = Checks {
            method: self.method,
            claims: self.claims,
            validation: &self.validation,
            issuer: self.issuer.as_deref(),
            audience: self.audience.as_deref(),
            leeway: self.leeway,
            now,
        };
        checks.run(raw_token, self.keys.as_ref()).await
    }
}

/// One-shot verification without issuer/audience checks or leeway.
pub async fn verify(
    raw_token: &str,
    expected_method: Algorithm,
    claims: ClaimsKind,
    keys: &dyn KeyResolver,
    now: i64,
) -> Result<VerifiedToken, AuthError> {
    let validation = signature_validation(expected_method);
    let checks = Checks {
        method: expected_method,
        claims,
        validation: &validation,
        issuer: None,
        audience: None,
        leeway: 0,
        now,
    };
    checks.run(raw_token, keys).await
}

// Time claims, iss and aud are checked by `Checks` (against an injectable
// clock), so the library validation only covers the signature.
fn signature_validation(method: Algorithm) -> Validation {
    let mut validation = Validation::new(method);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.leeway = 0;
    validation
}

struct Checks<'a> {
    method: Algorithm,
    claims: ClaimsKind,
    validation: &'a Validation,
    issuer: Option<&'a str>,
    audience: Option<&'a str>,
    leeway: i64,
    now: i64,
}

impl Checks<'_> {
    async fn run(&self, raw_token: &str, keys: &dyn KeyResolver) -> Result<VerifiedToken, AuthError> {
        let token = decode_unverified(raw_token, self.claims)?;

        // Compared as text: `none` and algorithms the library does not know
        // are a method mismatch, not a malformed token.
        if token.alg.parse::<Algorithm>().ok() != Some(self.method) {
            debug!(alg = %token.alg, expected = ?self.method, "signing method mismatch");
            return Err(AuthError::UnexpectedSigningMethod);
        }
        let header: Header = serde_json::from_value(Value::Object(token.header)).map_err(|e| {
            debug!(error = %e, "undecodable token header");
            AuthError::TokenMalformed
        })?;
        let claims = token.claims;

        if let Some(exp) = claims.expires_at()
            && self.now > exp.saturating_add(self.leeway)
        {
            return Err(AuthError::TokenExpired);
        }
        if let Some(nbf) = claims.not_before()
            && self.now < nbf.saturating_sub(self.leeway)
        {
            return Err(AuthError::TokenNotActive);
        }

        if let Some(issuer) = self.issuer
            && claims.issuer() != Some(issuer)
        {
            debug!(iss = ?claims.issuer(), expected = issuer, "issuer mismatch");
            return Err(AuthError::TokenInvalid);
        }
        if let Some(audience) = self.audience
            && !claims.audience().is_some_and(|aud| aud.contains(audience))
        {
            debug!(expected = audience, "audience mismatch");
            return Err(AuthError::TokenInvalid);
        }

        let key: DecodingKey = keys.resolve(&header).await.map_err(AuthError::KeyResolution)?;

        if let Err(err) = jsonwebtoken::decode::<Value>(raw_token, &key, self.validation) {
            debug!(error = %err, "token failed validation");
            return Err(AuthError::TokenInvalid);
        }

        Ok(VerifiedToken {
            header,
            claims: Arc::new(claims),
            valid: true,
        })
    }
}

/// Structurally decoded token; nothing here has been checked against a key.
struct Unverified {
    alg: String,
    header: Map<String, Value>,
    claims: ClaimsShape,
}

fn decode_unverified(raw_token: &str, kind: ClaimsKind) -> Result<Unverified, AuthError> {
    let segments: Vec<&str> = raw_token.split('.').collect();
    let [header, payload, signature] = segments.as_slice() else {
        return Err(AuthError::TokenMalformed);
    };

    let header = decode_segment(header)?;
    let Value::Object(header) = header else {
        return Err(AuthError::TokenMalformed);
    };
    let Some(alg) = header.get("alg").and_then(Value::as_str).map(str::to_owned) else {
        debug!("token header carries no alg");
        return Err(AuthError::TokenMalformed);
    };

    if signature.is_empty() || URL_SAFE_NO_PAD.decode(signature).is_err() {
        return Err(AuthError::TokenMalformed);
    }

    let claims = kind.decode(decode_segment(payload)?).map_err(|e| {
        debug!(error = %e, "undecodable token claims");
        AuthError::TokenMalformed
    })?;

    Ok(Unverified {
        alg,
        header,
        claims,
    })
}

fn decode_segment(segment: &str) -> Result<Value, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::TokenMalformed)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::TokenMalformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::authn::keys::{KeyError, StaticKeyResolver};
    use crate::services::authn::signer::sign;
    use async_trait::async_trait;
    use jsonwebtoken::EncodingKey;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const NOW: i64 = 1_700_000_000;
    const SECRET: &[u8] = b"unit-test-secret";

    fn hs256_verifier(claims: ClaimsKind) -> TokenVerifier {
        let keys = StaticKeyResolver::new().with_key("k1", DecodingKey::from_secret(SECRET));
        TokenVerifier::new(Algorithm::HS256, claims, Arc::new(keys)).with_clock(|| NOW)
    }

    fn hs256_token(claims: Value) -> String {
        sign("k1", &EncodingKey::from_secret(SECRET), Algorithm::HS256, &claims).unwrap()
    }

    #[tokio::test]
    async fn valid_token_round_trips_claims() {
        let claims = json!({"sub": "u1", "exp": NOW + 60, "role": "admin"});
        let token = hs256_token(claims.clone());

        let verified = hs256_verifier(ClaimsKind::Map).verify(&token).await.unwrap();
        assert!(verified.valid);
        assert_eq!(verified.header.kid.as_deref(), Some("k1"));
        assert_eq!(verified.claims.to_value(), claims);
    }

    #[tokio::test]
    async fn wrong_segment_count_is_malformed() {
        let verifier = hs256_verifier(ClaimsKind::Map);
        for raw in ["", "abc", "a.b", "a.b.c.d"] {
            assert!(
                matches!(verifier.verify(raw).await, Err(AuthError::TokenMalformed)),
                "{raw}"
            );
        }
    }

    #[tokio::test]
    async fn malformed_wins_over_expired_looking_payload() {
        // Readable, long expired payload behind a garbage header.
        let payload = URL_SAFE_NO_PAD.encode(br#"{"exp":1}"#);
        let raw = format!("!!!.{payload}.c2ln");

        assert!(matches!(
            hs256_verifier(ClaimsKind::Map).verify(&raw).await,
            Err(AuthError::TokenMalformed)
        ));
    }

    #[tokio::test]
    async fn expiry_and_not_before_are_strict() {
        let verifier = hs256_verifier(ClaimsKind::Registered);

        let at_exp = hs256_token(json!({"sub": "u1", "exp": NOW}));
        assert!(verifier.verify(&at_exp).await.is_ok());

        let expired = hs256_token(json!({"sub": "u1", "exp": NOW - 1}));
        assert!(matches!(verifier.verify(&expired).await, Err(AuthError::TokenExpired)));

        let at_nbf = hs256_token(json!({"sub": "u1", "nbf": NOW}));
        assert!(verifier.verify(&at_nbf).await.is_ok());

        let early = hs256_token(json!({"sub": "u1", "nbf": NOW + 1}));
        assert!(matches!(verifier.verify(&early).await, Err(AuthError::TokenNotActive)));
    }

    #[tokio::test]
    async fn leeway_widens_the_time_window() {
        let verifier = hs256_verifier(ClaimsKind::Map).with_leeway(30);
        let token = hs256_token(json!({"exp": NOW - 10, "nbf": NOW + 10}));
        assert!(verifier.verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn expired_wins_over_bad_signature() {
        let token = sign(
            "k1",
            &EncodingKey::from_secret(b"another-secret"),
            Algorithm::HS256,
            &json!({"exp": NOW - 100}),
        )
        .unwrap();

        assert!(matches!(
            hs256_verifier(ClaimsKind::Map).verify(&token).await,
            Err(AuthError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn bad_signature_is_generic_invalid() {
        let token = sign(
            "k1",
            &EncodingKey::from_secret(b"another-secret"),
            Algorithm::HS256,
            &json!({"exp": NOW + 100}),
        )
        .unwrap();

        assert!(matches!(
            hs256_verifier(ClaimsKind::Map).verify(&token).await,
            Err(AuthError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn method_mismatch_is_reported_before_key_lookup() {
        // HS384 token; the resolver has no key for its kid at all.
        let token = sign(
            "unknown",
            &EncodingKey::from_secret(SECRET),
            Algorithm::HS384,
            &json!({"exp": NOW + 100}),
        )
        .unwrap();

        assert!(matches!(
            hs256_verifier(ClaimsKind::Map).verify(&token).await,
            Err(AuthError::UnexpectedSigningMethod)
        ));
    }

    #[tokio::test]
    async fn resolver_failure_surfaces_inner_error() {
        let token = sign(
            "k9",
            &EncodingKey::from_secret(SECRET),
            Algorithm::HS256,
            &json!({"exp": NOW + 100}),
        )
        .unwrap();

        let err = hs256_verifier(ClaimsKind::Map).verify(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::KeyResolution(KeyError::UnknownKeyId(ref kid)) if kid == "k9"));
    }

    #[tokio::test]
    async fn issuer_and_audience_are_enforced_when_configured() {
        let verifier = hs256_verifier(ClaimsKind::Registered)
            .with_issuer("https://issuer.example")
            .with_audience("orders");

        let good = hs256_token(json!({
            "iss": "https://issuer.example", "aud": ["orders", "billing"], "exp": NOW + 10
        }));
        assert!(verifier.verify(&good).await.is_ok());

        let wrong_aud = hs256_token(json!({
            "iss": "https://issuer.example", "aud": "billing", "exp": NOW + 10
        }));
        assert!(matches!(verifier.verify(&wrong_aud).await, Err(AuthError::TokenInvalid)));

        let missing_iss = hs256_token(json!({"aud": "orders", "exp": NOW + 10}));
        assert!(matches!(verifier.verify(&missing_iss).await, Err(AuthError::TokenInvalid)));
    }

    #[tokio::test]
    async fn none_and_unsupported_algorithms_are_a_method_mismatch() {
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"u1"}"#);
        for alg in ["none", "ES512", "hs256"] {
            let header = URL_SAFE_NO_PAD.encode(format!(r#"{{"alg":"{alg}","kid":"k1"}}"#));
            let raw = format!("{header}.{payload}.c2ln");
            assert!(
                matches!(
                    hs256_verifier(ClaimsKind::Map).verify(&raw).await,
                    Err(AuthError::UnexpectedSigningMethod)
                ),
                "{alg}"
            );
        }

        // No alg at all is still structurally broken.
        let header = URL_SAFE_NO_PAD.encode(br#"{"kid":"k1"}"#);
        let raw = format!("{header}.{payload}.c2ln");
        assert!(matches!(
            hs256_verifier(ClaimsKind::Map).verify(&raw).await,
            Err(AuthError::TokenMalformed)
        ));
    }

    #[tokio::test]
    async fn issuer_mismatch_wins_over_unknown_kid() {
        let verifier = hs256_verifier(ClaimsKind::Map).with_issuer("https://good");
        let token = sign(
            "k9",
            &EncodingKey::from_secret(SECRET),
            Algorithm::HS256,
            &json!({"iss": "https://evil", "exp": NOW + 100}),
        )
        .unwrap();

        assert!(matches!(verifier.verify(&token).await, Err(AuthError::TokenInvalid)));
    }

    struct CountingResolver(AtomicUsize);

    #[async_trait]
    impl KeyResolver for CountingResolver {
        async fn resolve(&self, header: &Header) -> Result<DecodingKey, KeyError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(KeyError::UnknownKeyId(header.kid.clone().unwrap_or_default()))
        }
    }

    #[tokio::test]
    async fn rejected_tokens_never_reach_the_resolver() {
        let resolver = Arc::new(CountingResolver(AtomicUsize::new(0)));
        let verifier = TokenVerifier::new(Algorithm::HS256, ClaimsKind::Map, resolver.clone())
            .with_audience("orders")
            .with_clock(|| NOW);

        let expired = hs256_token(json!({"aud": "orders", "exp": NOW - 1}));
        assert!(matches!(verifier.verify(&expired).await, Err(AuthError::TokenExpired)));

        let early = hs256_token(json!({"aud": "orders", "nbf": NOW + 60}));
        assert!(matches!(verifier.verify(&early).await, Err(AuthError::TokenNotActive)));

        let foreign = hs256_token(json!({"aud": "billing", "exp": NOW + 60}));
        assert!(matches!(verifier.verify(&foreign).await, Err(AuthError::TokenInvalid)));

        assert_eq!(resolver.0.load(Ordering::SeqCst), 0);

        let fresh = hs256_token(json!({"aud": "orders", "exp": NOW + 60}));
        assert!(matches!(verifier.verify(&fresh).await, Err(AuthError::KeyResolution(_))));
        assert_eq!(resolver.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn free_function_uses_supplied_time() {
        let keys = StaticKeyResolver::single(DecodingKey::from_secret(SECRET));
        let token = hs256_token(json!({"exp": NOW}));

        assert!(verify(&token, Algorithm::HS256, ClaimsKind::Map, &keys, NOW).await.is_ok());
        assert!(matches!(
            verify(&token, Algorithm::HS256, ClaimsKind::Map, &keys, NOW + 1).await,
            Err(AuthError::TokenExpired)
        ));
    }
}
