/*
 * Responsibility
 * - Read everything the pipeline needs once, at startup (.env via dotenvy, then the process env)
 * - Reject incomplete or unparseable settings up front (ConfigError)
 * - from_lookup() takes any key -> value source so tests never touch the process env
 */
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use thiserror::Error;

use crate::middleware::http::HttpLimits;
use crate::services::authn::ClaimsKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(value: Option<String>) -> Self {
        match value
            .unwrap_or_else(|| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration: {0}")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("failed to read {key} from {path}: {source}")]
    Unreadable {
        key: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where verification keys come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeySource {
    Jwks { url: String, timeout: Duration },
    /// A single PEM key; without a kid it answers every token.
    Static { kid: Option<String>, pem: String },
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub keys: KeySource,
    pub signing_method: Algorithm,
    pub claims: ClaimsKind,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub leeway_seconds: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicyConfig {
    /// Authenticate only.
    None,
    InProcess {
        module: String,
        query: String,
    },
    Remote {
        base_url: String,
        query: String,
        timeout: Duration,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub http: HttpLimits,
    pub auth: AuthConfig,
    pub policy: PolicyConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let port: u16 = env.parsed_or("PORT", 3000)?;
        let addr = SocketAddr::from_str(&format!("0.0.0.0:{port}"))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::parse(env.get("APP_ENV"));

        let defaults = HttpLimits::default();
        let http = HttpLimits {
            request_timeout: Duration::from_secs(
                env.parsed_or("HTTP_TIMEOUT_SECONDS", defaults.request_timeout.as_secs())?,
            ),
            body_limit_bytes: env.parsed_or("HTTP_BODY_LIMIT_BYTES", defaults.body_limit_bytes)?,
        };

        Ok(Config {
            addr,
            app_env,
            http,
            auth: auth_config(&env)?,
            policy: policy_config(&env)?,
        })
    }
}

fn auth_config(env: &Env<'_>) -> Result<AuthConfig, ConfigError> {
    let keys = match (env.get("JWKS_URL"), env.get("JWT_PUBLIC_KEY_PEM")) {
        (Some(url), _) => KeySource::Jwks {
            url,
            timeout: Duration::from_millis(env.parsed_or("JWKS_TIMEOUT_MS", 5000)?),
        },
        (None, Some(pem)) => KeySource::Static {
            kid: env.get("JWT_KEY_ID"),
            // Single-line env values carry literal "\n".
            pem: pem.replace("\\n", "\n"),
        },
        (None, None) => return Err(ConfigError::Missing("JWKS_URL")),
    };

    let signing_method = match env.get("JWT_SIGNING_METHOD") {
        Some(value) => Algorithm::from_str(value.trim())
            .map_err(|_| ConfigError::Invalid("JWT_SIGNING_METHOD"))?,
        None => Algorithm::RS256,
    };

    let claims = match env.get("JWT_CLAIMS") {
        Some(value) => value
            .parse::<ClaimsKind>()
            .map_err(|_| ConfigError::Invalid("JWT_CLAIMS"))?,
        None => ClaimsKind::default(),
    };

    Ok(AuthConfig {
        keys,
        signing_method,
        claims,
        issuer: env.get("AUTH_ISSUER"),
        audience: env.get("AUTH_AUDIENCE"),
        leeway_seconds: env.parsed_or("ACCESS_TOKEN_LEEWAY_SECONDS", 0)?,
    })
}

fn policy_config(env: &Env<'_>) -> Result<PolicyConfig, ConfigError> {
    let mode = env
        .get("POLICY_MODE")
        .unwrap_or_else(|| "none".to_string())
        .to_ascii_lowercase();

    match mode.as_str() {
        "none" | "off" => Ok(PolicyConfig::None),
        "inprocess" | "in-process" | "local" => {
            let module = match (env.get("POLICY_MODULE"), env.get("POLICY_FILE")) {
                (Some(module), _) => module.replace("\\n", "\n"),
                (None, Some(path)) => {
                    let path = PathBuf::from(path);
                    std::fs::read_to_string(&path).map_err(|source| ConfigError::Unreadable {
                        key: "POLICY_FILE",
                        path,
                        source,
                    })?
                }
                (None, None) => return Err(ConfigError::Missing("POLICY_MODULE")),
            };
            Ok(PolicyConfig::InProcess {
                module,
                query: env.required("POLICY_QUERY")?,
            })
        }
        "remote" | "sidecar" => Ok(PolicyConfig::Remote {
            base_url: env
                .get("OPA_URL")
                .unwrap_or_else(|| "http://localhost:8181".to_string()),
            query: env.required("POLICY_QUERY")?,
            timeout: Duration::from_millis(env.parsed_or("POLICY_TIMEOUT_MS", 5000)?),
        }),
        _ => Err(ConfigError::Invalid("POLICY_MODE")),
    }
}

struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    /// Unset and blank are the same.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn parsed_or<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid(key)),
            None => Ok(default),
        }
    }
}
