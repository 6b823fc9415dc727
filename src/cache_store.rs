//! Persisted backing for the record cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use log::debug;
use rusqlite::{params, Connection};

use crate::acquisition::cache::CacheEntry;
use crate::error::CacheStoreError;

/// Key-value boundary the cache writes through to.
pub trait CacheStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<CacheEntry>, CacheStoreError>;
    fn put(&self, entry: &CacheEntry) -> Result<(), CacheStoreError>;
    fn remove(&self, key: &str) -> Result<(), CacheStoreError>;
    /// Removes everything and returns the number of rows dropped.
    fn clear(&self) -> Result<usize, CacheStoreError>;
}

pub fn default_cache_db_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("titlelink").join("record_cache.db"))
}

pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
}

impl SqliteCacheStore {
    pub fn open(path: &Path) -> Result<Self, CacheStoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        debug!("CacheStore: opened {}", path.display());
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, CacheStoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, CacheStoreError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn initialize_schema(&self) -> Result<(), CacheStoreError> {
        self.conn().execute(
            "CREATE TABLE IF NOT EXISTS record_cache (
                key TEXT PRIMARY KEY,
                record_json TEXT NOT NULL,
                inserted_at_unix_ms INTEGER NOT NULL,
                last_access_unix_ms INTEGER NOT NULL,
                hit_count INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;
        Ok(())
    }
}

impl CacheStore for SqliteCacheStore {
    fn load_all(&self) -> Result<Vec<CacheEntry>, CacheStoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT key, record_json, inserted_at_unix_ms, last_access_unix_ms, hit_count
             FROM record_cache",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (key, record_json, inserted_at, last_access, hit_count) = row?;
            let record = match serde_json::from_str(&record_json) {
                Ok(record) => record,
                Err(err) => {
                    debug!("CacheStore: skipping unreadable row '{}': {}", key, err);
                    continue;
                }
            };
            entries.push(CacheEntry {
                key,
                record,
                inserted_at_unix_ms: inserted_at.max(0) as u64,
                last_access_unix_ms: last_access.max(0) as u64,
                hit_count: hit_count.max(0) as u64,
            });
        }
        Ok(entries)
    }

    fn put(&self, entry: &CacheEntry) -> Result<(), CacheStoreError> {
        let record_json = serde_json::to_string(&entry.record)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO record_cache
                (key, record_json, inserted_at_unix_ms, last_access_unix_ms, hit_count)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.key,
                record_json,
                entry.inserted_at_unix_ms.min(i64::MAX as u64) as i64,
                entry.last_access_unix_ms.min(i64::MAX as u64) as i64,
                entry.hit_count.min(i64::MAX as u64) as i64,
            ],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheStoreError> {
        self.conn()
            .execute("DELETE FROM record_cache WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn clear(&self) -> Result<usize, CacheStoreError> {
        Ok(self.conn().execute("DELETE FROM record_cache", [])?)
    }
}

/// Non-persistent store, useful for embedding without a database.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CacheStore for MemoryCacheStore {
    fn load_all(&self) -> Result<Vec<CacheEntry>, CacheStoreError> {
        Ok(self.entries().values().cloned().collect())
    }

    fn put(&self, entry: &CacheEntry) -> Result<(), CacheStoreError> {
        self.entries().insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheStoreError> {
        self.entries().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<usize, CacheStoreError> {
        let mut entries = self.entries();
        let count = entries.len();
        entries.clear();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CandidateRecord, MetricKey, MetricSet, SourceKind};
    use std::time::Duration;

    fn entry(key: &str, inserted_at: u64) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            record: CandidateRecord::new(SourceKind::Scraped, "42", "Hollow Knight")
                .with_metrics(
                    MetricSet::new()
                        .with(MetricKey::Main, Some(Duration::from_secs(27 * 3600)))
                        .with(MetricKey::AllStyles, None),
                )
                .with_platform("PC"),
            inserted_at_unix_ms: inserted_at,
            last_access_unix_ms: inserted_at,
            hit_count: 3,
        }
    }

    #[test]
    fn test_sqlite_store_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("nested").join("record_cache.db");
        {
            let store = SqliteCacheStore::open(&path).expect("store should open");
            store.put(&entry("id:42", 1_000)).expect("put should succeed");
            store.put(&entry("name:celeste", 2_000)).expect("put should succeed");
            store.remove("name:celeste").expect("remove should succeed");
        }
        let reopened = SqliteCacheStore::open(&path).expect("store should reopen");
        let entries = reopened.load_all().expect("load should succeed");
        assert_eq!(entries, vec![entry("id:42", 1_000)]);
    }

    #[test]
    fn test_sqlite_put_replaces_existing_key() {
        let store = SqliteCacheStore::open_in_memory().expect("store should open");
        store.put(&entry("id:42", 1_000)).expect("put should succeed");
        store.put(&entry("id:42", 5_000)).expect("put should succeed");
        let entries = store.load_all().expect("load should succeed");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].inserted_at_unix_ms, 5_000);
        assert_eq!(store.clear().expect("clear should succeed"), 1);
    }

    #[test]
    fn test_sqlite_skips_corrupt_rows() {
        let store = SqliteCacheStore::open_in_memory().expect("store should open");
        store.put(&entry("id:42", 1_000)).expect("put should succeed");
        store
            .conn()
            .execute(
                "INSERT INTO record_cache VALUES ('id:bad', 'not json', 0, 0, 0)",
                [],
            )
            .expect("raw insert should succeed");
        let entries = store.load_all().expect("load should succeed");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "id:42");
    }

    #[test]
    fn test_memory_store_clear_reports_count() {
        let store = MemoryCacheStore::new();
        store.put(&entry("a", 1)).expect("put should succeed");
        store.put(&entry("b", 2)).expect("put should succeed");
        assert_eq!(store.clear().expect("clear should succeed"), 2);
        assert!(store.load_all().expect("load should succeed").is_empty());
    }
}
