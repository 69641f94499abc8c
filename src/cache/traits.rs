//! Cache store trait and error types
//!
//! This module defines the interface for response cache backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur in a cache backend
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache record for {url}: {message}")]
    Corrupt { url: String, message: String },

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// A cached HTTP response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Canonical URL the response belongs to
    pub url: String,

    /// URL the body was served from, after same-page redirects; the base for
    /// relative links
    pub final_url: String,

    pub status_code: u16,

    /// Response headers, lowercased names
    pub headers: BTreeMap<String, String>,

    pub body: String,

    pub fetched_at: DateTime<Utc>,

    /// After this instant the record counts as absent
    pub expires_at: DateTime<Utc>,
}

impl CacheRecord {
    /// Returns true once `now` is past the record's expiry
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Returns the Content-Type header, if one was stored
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }
}

/// Trait for response cache backends
///
/// Implementations must be usable from many fetch tasks at once; operations on
/// distinct URLs should not serialize on a single lock where the backend
/// allows it.
pub trait CacheStore: Send + Sync {
    /// Loads the record stored for a canonical URL, stale or not
    fn load(&self, url: &str) -> CacheResult<Option<CacheRecord>>;

    /// Inserts or replaces the record for its URL (last write wins)
    fn save(&self, record: &CacheRecord) -> CacheResult<()>;

    /// Removes every record, returning how many were removed
    fn clear(&self) -> CacheResult<u64>;

    /// Removes records that expired before `now`
    fn purge_expired(&self, now: DateTime<Utc>) -> CacheResult<u64>;

    /// Counts stored records
    fn count(&self) -> CacheResult<u64>;
}
