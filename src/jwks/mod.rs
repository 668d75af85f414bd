// src/jwks/mod.rs

pub mod model;

use crate::error::NilaIsbError;
use async_trait::async_trait;
use model::{JsonWebKey, JsonWebKeySet};
use reqwest::StatusCode;
use rsa::RsaPublicKey;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use url::Url;

/// Resolves a key id to the public key that verifies signatures made with it.
///
/// [`KeyCache`] is the production implementation; tests can provide fixed key sets.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn public_key(&self, kid: &str) -> Result<RsaPublicKey, NilaIsbError>;
}

/// A cache of the broker's signature verification keys.
///
/// The whole key set is fetched at once and replaces the previous one. A fetch is
/// skipped while less than `interval` has passed since the last successful one, so
/// lookups under load cause at most one outbound call per interval.
#[derive(Clone)]
pub struct KeyCache {
    // The cache is internally ref-counted to allow for cheap cloning.
    inner: Arc<Inner>,
}

struct Inner {
    http_client: reqwest::Client,
    jwks_url: Url,
    interval: Duration,
    // Held for the whole check-fetch-replace sequence.
    state: Mutex<KeyCacheState>,
}

#[derive(Default)]
struct KeyCacheState {
    keys: Vec<JsonWebKey>,
    last_refresh: Option<Instant>,
}

impl KeyCacheState {
    fn is_fresh(&self, interval: Duration) -> bool {
        self.last_refresh.is_some_and(|at| at.elapsed() < interval)
    }
}

impl KeyCache {
    /// Creates a new `KeyCache`. No request is made until the first refresh or lookup.
    pub fn new(jwks_url: Url, interval: Duration, timeout: Duration) -> Result<Self, NilaIsbError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NilaIsbError::KeySource(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(http_client, jwks_url, interval))
    }

    /// Creates a `KeyCache` on top of an existing HTTP client.
    pub fn with_client(http_client: reqwest::Client, jwks_url: Url, interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                http_client,
                jwks_url,
                interval,
                state: Mutex::new(KeyCacheState::default()),
            }),
        }
    }

    /// Fetches the key set unless it was fetched less than `interval` ago.
    pub async fn refresh(&self) -> Result<(), NilaIsbError> {
        let mut state = self.inner.state.lock().await;
        self.refresh_locked(&mut state).await
    }

    /// Refreshes (subject to the interval) and returns the decoded key for `kid`.
    pub async fn lookup(&self, kid: &str) -> Result<RsaPublicKey, NilaIsbError> {
        let mut state = self.inner.state.lock().await;
        self.refresh_locked(&mut state).await?;

        let jwk = state
            .keys
            .iter()
            .find(|jwk| !jwk.kid.is_empty() && jwk.kid == kid)
            .ok_or_else(|| NilaIsbError::KeyNotFound(kid.to_string()))?;
        jwk.decode()
    }

    /// The key ids of the currently cached key set. Records without a `kid` are left out.
    pub async fn key_ids(&self) -> Vec<String> {
        let state = self.inner.state.lock().await;
        state
            .keys
            .iter()
            .filter(|jwk| !jwk.kid.is_empty())
            .map(|jwk| jwk.kid.clone())
            .collect()
    }

    #[instrument(level = "debug", skip(self, state), fields(url = %self.inner.jwks_url))]
    async fn refresh_locked(&self, state: &mut KeyCacheState) -> Result<(), NilaIsbError> {
        if state.is_fresh(self.inner.interval) {
            debug!("Key set is fresh, skipping fetch.");
            return Ok(());
        }

        let response = self
            .inner
            .http_client
            .get(self.inner.jwks_url.clone())
            .send()
            .await
            .map_err(|e| NilaIsbError::KeySource(format!("GET {} failed: {}", self.inner.jwks_url, e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(NilaIsbError::KeySource(format!(
                "GET {} returned status code {}",
                self.inner.jwks_url,
                status.as_u16()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| NilaIsbError::KeySource(format!("failed to read key set body: {e}")))?;
        let set: JsonWebKeySet = serde_json::from_slice(&body)
            .map_err(|e| NilaIsbError::KeyFormat(format!("failed to parse key set: {e}")))?;

        debug!("Fetched {} keys.", set.keys.len());
        state.keys = set.keys;
        state.last_refresh = Some(Instant::now());
        Ok(())
    }
}

#[async_trait]
impl KeyProvider for KeyCache {
    async fn public_key(&self, kid: &str) -> Result<RsaPublicKey, NilaIsbError> {
        self.lookup(kid).await
    }
}
