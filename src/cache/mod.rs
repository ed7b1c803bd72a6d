//! TTL-bounded cache overlay on the durable store
//!
//! Entries live in the `cache` collection with an absolute expiry timestamp.
//! Reads evict lazily: an expired entry is deleted and reported absent, never
//! returned stale. [`CacheSweeper`] runs the periodic cleanup.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::StoreResult;
use crate::storage::{Collection, StorageEngine};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: JsonValue,
    pub expires_at: u64, // Unix timestamp (milliseconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// TTL key/value store over the `cache` collection.
#[derive(Clone)]
pub struct CacheStore {
    engine: Arc<StorageEngine>,
}

impl CacheStore {
    pub fn new(engine: Arc<StorageEngine>) -> Self {
        Self { engine }
    }

    /// Store `value` under `key`, overwriting any existing entry.
    pub fn set(
        &self,
        key: &str,
        value: JsonValue,
        ttl: Duration,
        domain: Option<&str>,
    ) -> StoreResult<()> {
        let entry = CacheEntry {
            key: key.to_string(),
            value,
            expires_at: now_millis() + ttl.as_millis() as u64,
            domain: domain.map(|d| d.to_string()),
        };
        let bytes = serde_json::to_vec(&entry)?;
        self.engine.put(Collection::Cache, key, &bytes)
    }

    /// Fetch a live value. An expired entry is deleted and `None` returned.
    pub fn get(&self, key: &str) -> StoreResult<Option<JsonValue>> {
        let Some(bytes) = self.engine.get(Collection::Cache, key)? else {
            return Ok(None);
        };

        let entry: CacheEntry = serde_json::from_slice(&bytes)?;
        if entry.expires_at < now_millis() {
            self.engine.delete(Collection::Cache, key)?;
            tracing::debug!("Cache entry '{}' expired, evicted on read", key);
            return Ok(None);
        }

        Ok(Some(entry.value))
    }

    pub fn remove(&self, key: &str) -> StoreResult<()> {
        self.engine.delete(Collection::Cache, key)
    }

    /// Delete every expired entry, returning how many were removed.
    /// Idempotent per key; safe to run concurrently with `get`/`set`.
    pub fn sweep(&self) -> StoreResult<usize> {
        let now = now_millis();
        let entries = self.engine.scan_prefix(Collection::Cache, "")?;

        let mut removed = 0;
        for (key, bytes) in entries {
            let entry: CacheEntry = match serde_json::from_slice(&bytes) {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Dropping corrupt cache entry '{}': {}", key, e);
                    self.engine.delete(Collection::Cache, &key)?;
                    continue;
                }
            };
            if entry.expires_at < now {
                self.engine.delete(Collection::Cache, &key)?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::debug!("Cache sweep removed {} expired entries", removed);
        }
        Ok(removed)
    }

    pub fn len(&self) -> StoreResult<usize> {
        self.engine.count(Collection::Cache)
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// Background task that sweeps expired cache entries on an interval.
pub struct CacheSweeper {
    cache: CacheStore,
    interval: Duration,
}

impl CacheSweeper {
    pub fn new(cache: CacheStore, interval: Duration) -> Self {
        Self { cache, interval }
    }

    /// Run the sweep loop. Exits when the underlying store is closed.
    pub async fn start(self: Arc<Self>) {
        tracing::info!("Starting cache sweeper (interval: {:?})", self.interval);
        loop {
            tokio::time::sleep(self.interval).await;
            match self.cache.sweep() {
                Ok(_) => {}
                Err(crate::error::StoreError::Closed) => {
                    tracing::debug!("Cache sweeper stopping: store closed");
                    return;
                }
                Err(e) => {
                    tracing::warn!("Cache sweep failed: {}", e);
                }
            }
        }
    }
}
