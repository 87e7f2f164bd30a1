//! Cache-aside token lookups.
//!
//! Keys: `token:val:{value}` and `token:id:{id}`. A miss (or a fast-store
//! failure) reads the authoritative `TokenStore` and schedules a detached
//! task that writes the result back:
//!
//! - found: JSON snapshot, TTL = base ± 10% jitter
//! - absent: the `null` marker with the short negative TTL
//!
//! Population failures are logged and dropped. Invalidation bumps an epoch
//! first, so populations that started before it do not write stale data.

use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

use super::models::Token;
use super::store::TokenStore;
use crate::error::{StoreError, with_deadline};

/// Marker cached for lookups that found nothing.
pub const NEGATIVE_MARKER: &str = "null";

/// Maximum relative TTL perturbation.
pub const TTL_JITTER_RATIO: f64 = 0.1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheStoreError {
    #[error("fast store unavailable: {0}")]
    Unavailable(String),
}

/// Key/value store with per-entry TTL.
#[async_trait]
pub trait FastStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheStoreError>;

    async fn del(&self, keys: &[String]) -> Result<(), CacheStoreError>;
}

/// DashMap-backed fast store with lazy expiry.
#[derive(Default)]
pub struct MemoryFastStore {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryFastStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, (_, expires_at)| *expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl FastStore for MemoryFastStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError> {
        let now = Instant::now();
        let hit = self
            .entries
            .get(key)
            .filter(|entry| entry.1 > now)
            .map(|entry| entry.0.clone());
        if hit.is_none() {
            self.entries.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
        }
        Ok(hit)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheStoreError> {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<(), CacheStoreError> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub token_ttl_secs: u64,
    pub negative_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            token_ttl_secs: 300,
            negative_ttl_secs: 60,
        }
    }
}

pub fn value_key(value: &str) -> String {
    format!("token:val:{}", value)
}

pub fn id_key(token_id: &str) -> String {
    format!("token:id:{}", token_id)
}

/// Base TTL perturbed uniformly by up to ±10%.
pub fn jittered_ttl(base: Duration) -> Duration {
    let factor = 1.0 + rand::thread_rng().gen_range(-TTL_JITTER_RATIO..=TTL_JITTER_RATIO);
    base.mul_f64(factor)
}

/// Token lookups through an optional fast store.
pub struct TokenCache {
    source: Arc<dyn TokenStore>,
    fast: Option<Arc<dyn FastStore>>,
    token_ttl: Duration,
    negative_ttl: Duration,
    epoch: Arc<AtomicU64>,
    store_deadline: Duration,
}

impl TokenCache {
    pub fn new(
        source: Arc<dyn TokenStore>,
        fast: Option<Arc<dyn FastStore>>,
        settings: &CacheSettings,
        store_deadline: Duration,
    ) -> Self {
        Self {
            source,
            fast: fast.filter(|_| settings.enabled),
            token_ttl: Duration::from_secs(settings.token_ttl_secs),
            negative_ttl: Duration::from_secs(settings.negative_ttl_secs),
            epoch: Arc::new(AtomicU64::new(0)),
            store_deadline,
        }
    }

    /// The authoritative store behind the cache.
    pub fn source(&self) -> &Arc<dyn TokenStore> {
        &self.source
    }

    pub fn store_deadline(&self) -> Duration {
        self.store_deadline
    }

    pub async fn get_by_value(&self, value: &str) -> Result<Option<Token>, StoreError> {
        self.lookup(value_key(value), self.source.get_by_value(value))
            .await
    }

    pub async fn get_by_id(&self, token_id: &str) -> Result<Option<Token>, StoreError> {
        self.lookup(id_key(token_id), self.source.get_by_id(token_id))
            .await
    }

    async fn lookup<F>(&self, key: String, fetch: F) -> Result<Option<Token>, StoreError>
    where
        F: Future<Output = Result<Option<Token>, StoreError>>,
    {
        let Some(fast) = &self.fast else {
            return with_deadline(self.store_deadline, fetch).await;
        };

        match fast.get(&key).await {
            Ok(Some(raw)) if raw == NEGATIVE_MARKER => {
                tracing::debug!(key = %redact_key(&key), "token cache negative hit");
                return Ok(None);
            }
            Ok(Some(raw)) => match serde_json::from_str::<Token>(&raw) {
                Ok(token) => {
                    tracing::debug!(key = %redact_key(&key), "token cache hit");
                    return Ok(Some(token));
                }
                Err(e) => {
                    tracing::warn!(key = %redact_key(&key), error = %e, "corrupt token cache entry")
                }
            },
            Ok(None) => tracing::debug!(key = %redact_key(&key), "token cache miss"),
            Err(e) => {
                tracing::warn!(key = %redact_key(&key), error = %e, "fast store read failed, using source")
            }
        }

        let epoch = self.epoch.load(Ordering::Acquire);
        let result = with_deadline(self.store_deadline, fetch).await?;
        self.populate(Arc::clone(fast), key, result.clone(), epoch);
        Ok(result)
    }

    /// Write a lookup result back in a detached task.
    fn populate(
        &self,
        fast: Arc<dyn FastStore>,
        key: String,
        token: Option<Token>,
        started_at_epoch: u64,
    ) {
        let (value, ttl) = match token {
            Some(token) => match serde_json::to_string(&token) {
                Ok(json) => (json, jittered_ttl(self.token_ttl)),
                Err(e) => {
                    tracing::warn!(error = %e, "token snapshot not serialisable");
                    return;
                }
            },
            None => (NEGATIVE_MARKER.to_string(), self.negative_ttl),
        };
        let epoch = Arc::clone(&self.epoch);

        tokio::spawn(async move {
            if epoch.load(Ordering::Acquire) != started_at_epoch {
                tracing::debug!(key = %redact_key(&key), "skipping stale cache population");
                return;
            }
            if let Err(e) = fast.set(&key, value, ttl).await {
                tracing::warn!(key = %redact_key(&key), error = %e, "token cache population failed");
            }
        });
    }

    /// Remove both cache keys of a token. Failures are logged, not returned.
    pub async fn invalidate(&self, token_value: &str, token_id: &str) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let Some(fast) = &self.fast else {
            return;
        };
        let keys = [value_key(token_value), id_key(token_id)];
        if let Err(e) = fast.del(&keys).await {
            tracing::warn!(token_id, error = %e, "token cache invalidation failed");
        }
    }
}

/// Keep token values out of logs.
fn redact_key(key: &str) -> String {
    match key.strip_prefix("token:val:") {
        Some(value) => format!("token:val:{}", super::models::mask_token(value)),
        None => key.to_string(),
    }
}
