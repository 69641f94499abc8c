//! Response cache for the crawler
//!
//! This module provides the TTL response cache consulted before every fetch:
//! - `ResponseCache`, the front the crawler talks to (TTL, bypass, error policy)
//! - `CacheStore` backends: SQLite for persistence across runs, memory for
//!   ephemeral runs and tests
//!
//! Backend failures never reach the crawler. The front logs them and treats
//! the operation as a miss (for reads) or a no-op (for writes). Backend calls
//! block, so lookups and writes run on tokio's blocking pool.

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryCacheStore;
pub use sqlite::SqliteCacheStore;
pub use traits::{CacheError, CacheRecord, CacheResult, CacheStore};

use crate::config::CacheConfig;
use crate::url::CanonicalUrl;
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// File name of the cache database inside the cache directory
pub const CACHE_DB_FILE: &str = "sumi_cache.db";

/// Computes the storage key for a canonical URL (hex SHA-256)
pub fn cache_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// TTL-aware cache front shared by all fetch tasks
pub struct ResponseCache {
    store: Option<Arc<dyn CacheStore>>,
    enabled: AtomicBool,
    ttl: Duration,
}

impl ResponseCache {
    /// Creates a cache over `store` with the given TTL in seconds
    ///
    /// A TTL of zero or less makes every lookup a miss.
    pub fn new(store: Arc<dyn CacheStore>, ttl_secs: i64) -> Self {
        Self {
            store: Some(store),
            enabled: AtomicBool::new(true),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Creates a cache that never hits and never stores
    pub fn disabled() -> Self {
        Self {
            store: None,
            enabled: AtomicBool::new(false),
            ttl: Duration::zero(),
        }
    }

    /// Builds the cache described by the configuration
    ///
    /// # Returns
    ///
    /// * `Ok(ResponseCache)` - A disabled, in-memory or SQLite-backed cache
    /// * `Err(CacheError)` - The cache database could not be opened
    pub fn from_config(config: &CacheConfig, connections: usize) -> CacheResult<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }

        let store: Arc<dyn CacheStore> = if config.persistent {
            let path = Path::new(&config.directory).join(CACHE_DB_FILE);
            tracing::debug!("Opening response cache at {}", path.display());
            Arc::new(SqliteCacheStore::open(&path, connections)?)
        } else {
            Arc::new(MemoryCacheStore::new())
        };

        Ok(Self::new(store, config.ttl_secs))
    }

    /// Switches the cache into bypass mode for the rest of its lifetime
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some() && self.enabled.load(Ordering::Relaxed)
    }

    /// Looks up a fresh record for `url`
    ///
    /// Absent, expired and unreadable records are all misses.
    pub async fn get(&self, url: &CanonicalUrl) -> Option<CacheRecord> {
        if !self.is_enabled() || self.ttl <= Duration::zero() {
            return None;
        }
        let store = Arc::clone(self.store.as_ref()?);
        let key = url.as_str().to_string();

        let loaded = match tokio::task::spawn_blocking(move || store.load(&key)).await {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!("Cache lookup task for {} failed: {}", url, e);
                return None;
            }
        };

        match loaded {
            Ok(Some(record)) if !record.is_expired_at(Utc::now()) => Some(record),
            Ok(Some(_)) => {
                tracing::trace!("Cache record for {} is stale", url);
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Cache lookup failed for {}, bypassing: {}", url, e);
                None
            }
        }
    }

    /// Stores a response for `url`, stamping `expires_at = now + ttl`
    ///
    /// `final_url` is where the body was actually served from and becomes the
    /// base for relative links when the record is replayed.
    pub async fn put(
        &self,
        url: &CanonicalUrl,
        final_url: &str,
        status_code: u16,
        headers: &BTreeMap<String, String>,
        body: &str,
    ) {
        if !self.is_enabled() {
            return;
        }
        let Some(store) = self.store.as_ref().map(Arc::clone) else {
            return;
        };

        let fetched_at = Utc::now();
        let record = CacheRecord {
            url: url.as_str().to_string(),
            final_url: final_url.to_string(),
            status_code,
            headers: headers.clone(),
            body: body.to_string(),
            fetched_at,
            expires_at: fetched_at + self.ttl,
        };

        match tokio::task::spawn_blocking(move || store.save(&record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Cache write failed for {}, skipping: {}", url, e),
            Err(e) => tracing::warn!("Cache write task for {} failed: {}", url, e),
        }
    }

    /// Removes all cached records
    pub fn clear(&self) -> CacheResult<u64> {
        match self.store.as_ref() {
            Some(store) => store.clear(),
            None => Ok(0),
        }
    }

    /// Removes records past their expiry
    pub fn clear_expired(&self) -> CacheResult<u64> {
        match self.store.as_ref() {
            Some(store) => store.purge_expired(Utc::now()),
            None => Ok(0),
        }
    }

    /// Counts stored records, fresh or stale
    pub fn len(&self) -> CacheResult<u64> {
        match self.store.as_ref() {
            Some(store) => store.count(),
            None => Ok(0),
        }
    }

    pub fn is_empty(&self) -> CacheResult<bool> {
        self.len().map(|n| n == 0)
    }
}
