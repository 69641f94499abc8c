use crate::cache::traits::{CacheError, CacheRecord, CacheResult, CacheStore};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

/// Process-local cache backend, lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    records: RwLock<HashMap<String, CacheRecord>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn load(&self, url: &str) -> CacheResult<Option<CacheRecord>> {
        let records = self.records.read().map_err(|_| CacheError::LockPoisoned)?;
        Ok(records.get(url).cloned())
    }

    fn save(&self, record: &CacheRecord) -> CacheResult<()> {
        let mut records = self.records.write().map_err(|_| CacheError::LockPoisoned)?;
        records.insert(record.url.clone(), record.clone());
        Ok(())
    }

    fn clear(&self) -> CacheResult<u64> {
        let mut records = self.records.write().map_err(|_| CacheError::LockPoisoned)?;
        let removed = records.len() as u64;
        records.clear();
        Ok(removed)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> CacheResult<u64> {
        let mut records = self.records.write().map_err(|_| CacheError::LockPoisoned)?;
        let before = records.len();
        records.retain(|_, record| !record.is_expired_at(now));
        Ok((before - records.len()) as u64)
    }

    fn count(&self) -> CacheResult<u64> {
        let records = self.records.read().map_err(|_| CacheError::LockPoisoned)?;
        Ok(records.len() as u64)
    }
}
