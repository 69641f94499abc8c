//! SQLite cache backend
//!
//! Records live in a single WAL-mode database file. The store keeps a small
//! set of connections and routes each key to one of them, so lookups for
//! unrelated URLs do not queue behind one connection handle.

use crate::cache::schema::initialize_schema;
use crate::cache::traits::{CacheError, CacheRecord, CacheResult, CacheStore};
use crate::cache::cache_key;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// How long a connection waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed response cache
pub struct SqliteCacheStore {
    shards: Vec<Mutex<Connection>>,
}

impl SqliteCacheStore {
    /// Opens (or creates) the cache database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file; parent directories are created
    /// * `connections` - Number of pooled connections (at least one)
    pub fn open(path: &Path, connections: usize) -> CacheResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let first = Connection::open(path)?;
        first.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        first.busy_timeout(BUSY_TIMEOUT)?;
        initialize_schema(&first)?;

        let mut shards = vec![Mutex::new(first)];
        for _ in 1..connections.max(1) {
            let conn = Connection::open(path)?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
            shards.push(Mutex::new(conn));
        }

        Ok(Self { shards })
    }

    /// Creates a private in-memory database
    pub fn in_memory() -> CacheResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            shards: vec![Mutex::new(conn)],
        })
    }

    fn shard(&self, key: &str) -> CacheResult<MutexGuard<'_, Connection>> {
        let index = key
            .get(..2)
            .and_then(|prefix| usize::from_str_radix(prefix, 16).ok())
            .unwrap_or(0)
            % self.shards.len();

        self.shards[index]
            .lock()
            .map_err(|_| CacheError::LockPoisoned)
    }

    fn any(&self) -> CacheResult<MutexGuard<'_, Connection>> {
        self.shards[0].lock().map_err(|_| CacheError::LockPoisoned)
    }
}

/// Formats timestamps with a fixed width so they compare correctly as text
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(url: &str, value: &str) -> CacheResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| CacheError::Corrupt {
            url: url.to_string(),
            message: format!("bad timestamp '{}': {}", value, e),
        })
}

impl CacheStore for SqliteCacheStore {
    fn load(&self, url: &str) -> CacheResult<Option<CacheRecord>> {
        let key = cache_key(url);
        let conn = self.shard(&key)?;

        let row = conn
            .query_row(
                "SELECT url, final_url, status_code, headers, body, fetched_at, expires_at
                 FROM responses WHERE key = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u16>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((url, final_url, status_code, headers, body, fetched_at, expires_at)) = row
        else {
            return Ok(None);
        };

        // Rows written before final_url was stored
        let final_url = if final_url.is_empty() {
            url.clone()
        } else {
            final_url
        };

        Ok(Some(CacheRecord {
            final_url,
            headers: serde_json::from_str(&headers)?,
            fetched_at: parse_timestamp(&url, &fetched_at)?,
            expires_at: parse_timestamp(&url, &expires_at)?,
            url,
            status_code,
            body,
        }))
    }

    fn save(&self, record: &CacheRecord) -> CacheResult<()> {
        let key = cache_key(&record.url);
        let headers = serde_json::to_string(&record.headers)?;
        let conn = self.shard(&key)?;

        conn.execute(
            "INSERT OR REPLACE INTO responses
                 (key, url, final_url, status_code, headers, body, fetched_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                key,
                record.url,
                record.final_url,
                record.status_code,
                headers,
                record.body,
                format_timestamp(&record.fetched_at),
                format_timestamp(&record.expires_at),
            ],
        )?;
        Ok(())
    }

    fn clear(&self) -> CacheResult<u64> {
        let removed = self.any()?.execute("DELETE FROM responses", [])?;
        Ok(removed as u64)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> CacheResult<u64> {
        let removed = self.any()?.execute(
            "DELETE FROM responses WHERE expires_at < ?1",
            params![format_timestamp(&now)],
        )?;
        Ok(removed as u64)
    }

    fn count(&self) -> CacheResult<u64> {
        let count: i64 = self
            .any()?
            .query_row("SELECT COUNT(*) FROM responses", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
