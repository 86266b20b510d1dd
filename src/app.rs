/*
 * Responsibility
 * - Config読み込み → guard pipeline 組み立て (keys / verifier / authorizer) → Router
 * - Middleware の適用 (request-id / trace / limit / timeout)
 * - axum::serve() で起動
 */
use std::{panic, process, sync::Arc};

use axum::Router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::api::v1::handlers::whoami::whoami_endpoint;
use crate::config::{AuthConfig, Config, KeySource, PolicyConfig};
use crate::error::SetupError;
use crate::middleware::{self, AuthnInterceptor, AuthzInterceptor, PolicyInput};
use crate::pipeline::{Pipeline, endpoint_fn};
use crate::services::authn::keys::decoding_key_from_pem;
use crate::services::authn::{JwksKeyResolver, KeyResolver, StaticKeyResolver, TokenVerifier};
use crate::services::authz::{
    Authorizer, HttpPolicyClient, InProcessAuthorizer, RemoteAuthorizer,
};
use crate::state::{AppState, GuardPipeline};

fn init_tracing() {
    // RUST_LOG wins when set, e.g.
    // RUST_LOG=info,endpoint_guard=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");

        // Development: crash loudly. Production: default hook, keep serving.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::from_env()?;
    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting endpoint guard in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let pipeline = build_pipeline(&config).await?;
    let app = build_router(AppState::new(pipeline), &config);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// authn → (authz) → whoami endpoint. Key discovery and policy compilation
/// happen here, once.
pub async fn build_pipeline(config: &Config) -> Result<GuardPipeline, SetupError> {
    let verifier = build_verifier(&config.auth).await?;

    let mut pipeline = Pipeline::new(endpoint_fn(whoami_endpoint));
    if let Some(authorizer) = build_authorizer(&config.policy)? {
        tracing::info!(
            query = %authorizer.query(),
            location = ?authorizer.location(),
            "policy authorization enabled"
        );
        pipeline = pipeline
            .wrap(AuthzInterceptor::new(authorizer).with_input(PolicyInput::RequestWithClaims));
    }

    Ok(pipeline.wrap(AuthnInterceptor::new(verifier)))
}

pub async fn build_verifier(auth: &AuthConfig) -> Result<TokenVerifier, SetupError> {
    let keys = build_key_resolver(auth).await?;

    let mut verifier = TokenVerifier::new(auth.signing_method, auth.claims, keys)
        .with_leeway(auth.leeway_seconds);
    if let Some(issuer) = &auth.issuer {
        verifier = verifier.with_issuer(issuer);
    }
    if let Some(audience) = &auth.audience {
        verifier = verifier.with_audience(audience);
    }

    Ok(verifier)
}

pub async fn build_key_resolver(auth: &AuthConfig) -> Result<Arc<dyn KeyResolver>, SetupError> {
    match &auth.keys {
        KeySource::Jwks { url, timeout } => {
            let resolver = JwksKeyResolver::discover(url.as_str(), *timeout).await?;
            Ok(Arc::new(resolver))
        }
        KeySource::Static { kid, pem } => {
            let key = decoding_key_from_pem(auth.signing_method, pem)
                .map_err(SetupError::VerificationKey)?;
            let resolver = match kid {
                Some(kid) => StaticKeyResolver::new().with_key(kid.as_str(), key),
                None => StaticKeyResolver::single(key),
            };
            Ok(Arc::new(resolver))
        }
    }
}

pub fn build_authorizer(
    policy: &PolicyConfig,
) -> Result<Option<Arc<dyn Authorizer>>, SetupError> {
    let authorizer: Arc<dyn Authorizer> = match policy {
        PolicyConfig::None => return Ok(None),
        PolicyConfig::InProcess { module, query } => {
            Arc::new(InProcessAuthorizer::new(module, query)?)
        }
        PolicyConfig::Remote {
            base_url,
            query,
            timeout,
        } => {
            let client =
                HttpPolicyClient::new(base_url, *timeout).map_err(SetupError::PolicyClient)?;
            Arc::new(RemoteAuthorizer::new(query.as_str(), Arc::new(client)))
        }
    };

    Ok(Some(authorizer))
}

pub fn build_router(state: AppState, config: &Config) -> Router {
    let router = Router::new()
        .nest("/api/v1", api::v1::routes())
        .with_state(state);

    middleware::http::apply(router, config.http)
}
