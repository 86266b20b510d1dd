use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{DecodingKey, Header, jwk::JwkSet};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::services::authn::keys::{KeyError, KeyResolver};

#[derive(Debug, Error)]
pub enum JwksError {
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("failed to fetch key set: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("key set at {0} contains no usable keys")]
    Empty(String),
}

/// Key resolver backed by a remote JWK Set.
///
/// The set is fetched once by `discover`; afterwards an unknown `kid` triggers
/// at most one refetch per `min_refresh_interval`. Refetches are serialized
/// on their own lock and never hold the cache lock across the network call,
/// so known kids keep resolving while one is in flight.
pub struct JwksKeyResolver {
    url: String,
    http: reqwest::Client,
    min_refresh_interval: Duration,
    keys: RwLock<CachedKeys>,
    refresh: Mutex<()>,
}

struct CachedKeys {
    by_kid: HashMap<String, DecodingKey>,
    unnamed: Vec<DecodingKey>,
    fetched_at: Instant,
}

impl CachedKeys {
    fn len(&self) -> usize {
        self.by_kid.len() + self.unnamed.len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn only_key(&self) -> Option<&DecodingKey> {
        if self.len() != 1 {
            return None;
        }
        self.by_kid.values().next().or(self.unnamed.first())
    }
}

impl std::fmt::Debug for JwksKeyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksKeyResolver")
            .field("url", &self.url)
            .field("min_refresh_interval", &self.min_refresh_interval)
            .finish()
    }
}

impl JwksKeyResolver {
    pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

    /// Fetches the key set at `url`. Fails when the endpoint is unreachable,
    /// answers with a non-success status, or serves no usable key.
    pub async fn discover(url: impl Into<String>, timeout: Duration) -> Result<Self, JwksError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(JwksError::Client)?;

        Self::discover_with_client(url, http).await
    }

    pub async fn discover_with_client(
        url: impl Into<String>,
        http: reqwest::Client,
    ) -> Result<Self, JwksError> {
        let url = url.into();
        let keys = fetch(&http, &url).await?;

        debug!(url = %url, keys = keys.len(), "key set discovered");

        Ok(Self {
            url,
            http,
            min_refresh_interval: Self::DEFAULT_MIN_REFRESH_INTERVAL,
            keys: RwLock::new(keys),
            refresh: Mutex::new(()),
        })
    }

    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    async fn refresh_for(&self, kid: &str) -> Result<Option<DecodingKey>, KeyError> {
        let _refreshing = self.refresh.lock().await;

        {
            let cache = self.keys.read().await;
            // Another request may have refreshed while we waited for the lock.
            if let Some(key) = cache.by_kid.get(kid) {
                return Ok(Some(key.clone()));
            }
            if cache.fetched_at.elapsed() < self.min_refresh_interval {
                return Ok(None);
            }
        }

        debug!(url = %self.url, kid = %kid, "unknown kid, refreshing key set");
        let fresh = fetch(&self.http, &self.url).await.map_err(KeyError::Refresh)?;
        let key = fresh.by_kid.get(kid).cloned();
        *self.keys.write().await = fresh;

        Ok(key)
    }
}

#[async_trait]
impl KeyResolver for JwksKeyResolver {
    async fn resolve(&self, header: &Header) -> Result<DecodingKey, KeyError> {
        let Some(kid) = header.kid.as_deref() else {
            let cache = self.keys.read().await;
            return cache.only_key().cloned().ok_or(KeyError::MissingKeyId);
        };

        let cached = self.keys.read().await.by_kid.get(kid).cloned();
        if let Some(key) = cached {
            return Ok(key);
        }

        self.refresh_for(kid)
            .await?
            .ok_or_else(|| KeyError::UnknownKeyId(kid.to_string()))
    }
}

async fn fetch(http: &reqwest::Client, url: &str) -> Result<CachedKeys, JwksError> {
    let set: JwkSet = http
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let mut by_kid = HashMap::new();
    let mut unnamed = Vec::new();

    for jwk in &set.keys {
        let key = match DecodingKey::from_jwk(jwk) {
            Ok(key) => key,
            Err(err) => {
                warn!(kid = ?jwk.common.key_id, error = %err, "skipping unusable jwk");
                continue;
            }
        };
        match &jwk.common.key_id {
            Some(kid) => {
                by_kid.insert(kid.clone(), key);
            }
            None => unnamed.push(key),
        }
    }

    let keys = CachedKeys {
        by_kid,
        unnamed,
        fetched_at: Instant::now(),
    };
    if keys.is_empty() {
        return Err(JwksError::Empty(url.to_string()));
    }

    Ok(keys)
}
