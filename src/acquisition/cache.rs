//! In-process record cache with lazy TTL expiry and hit-weighted eviction.
//!
//! Entries optionally write through to a [`CacheStore`] so resolved records
//! survive restarts. Store failures are logged and never surface to callers;
//! the in-memory map stays authoritative for the running process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::cache_store::CacheStore;
use crate::error::CacheStoreError;
use crate::matching::normalize::{normalize, NormalizationLevel};
use crate::protocol::CandidateRecord;

const MAX_WEIGHTED_HITS: u64 = 32;

/// Settings read once when the cache is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl: Duration,
    pub capacity: usize,
    /// How much each hit (up to 32) pushes an entry's eviction score forward.
    pub hit_weight: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(7 * 24 * 60 * 60),
            capacity: 1000,
            hit_weight: Duration::from_secs(10 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub record: CandidateRecord,
    pub inserted_at_unix_ms: u64,
    pub last_access_unix_ms: u64,
    pub hit_count: u64,
}

impl CacheEntry {
    fn is_expired(&self, now_ms: u64, ttl_ms: u64) -> bool {
        now_ms.saturating_sub(self.inserted_at_unix_ms) > ttl_ms
    }

    fn eviction_score(&self, hit_weight_ms: u64) -> u64 {
        self.last_access_unix_ms
            .saturating_add(self.hit_count.min(MAX_WEIGHTED_HITS).saturating_mul(hit_weight_ms))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    stats: CacheStats,
}

pub fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis().min(u128::from(u64::MAX)) as u64)
        .unwrap_or(0)
}

/// Cache key for a lookup: the stable id when present, else the
/// standard-normalized name. The prefixes keep the two key spaces apart.
pub fn cache_key(name: &str, stable_id: Option<&str>) -> String {
    match stable_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => format!("id:{id}"),
        None => format!("name:{}", normalize(name, NormalizationLevel::Standard)),
    }
}

pub struct RecordCache {
    settings: CacheSettings,
    state: Mutex<CacheState>,
    store: Option<Arc<dyn CacheStore>>,
}

impl RecordCache {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(CacheState::default()),
            store: None,
        }
    }

    /// Builds a cache backed by `store`, loading every unexpired entry.
    ///
    /// Entries dropped here count toward [`CacheStats::expirations`] and
    /// [`CacheStats::evictions`].
    pub fn with_store(
        settings: CacheSettings,
        store: Arc<dyn CacheStore>,
    ) -> Result<Self, CacheStoreError> {
        let now_ms = unix_now_ms();
        let ttl_ms = duration_ms(settings.ttl);
        let mut state = CacheState::default();
        let mut stale = Vec::new();
        for entry in store.load_all()? {
            if entry.is_expired(now_ms, ttl_ms) {
                stale.push(entry.key);
            } else {
                state.entries.insert(entry.key.clone(), entry);
            }
        }
        for key in &stale {
            store.remove(key)?;
        }
        state.stats.expirations = stale.len() as u64;

        let cache = Self {
            settings,
            state: Mutex::new(state),
            store: Some(store),
        };
        let evicted = {
            let mut state = cache.lock_state();
            let evicted = cache.evict_to_capacity(&mut state, None);
            debug!(
                "Cache: loaded {} entries from store, dropped {} expired",
                state.entries.len(),
                stale.len()
            );
            evicted
        };
        cache.store_remove_all(&evicted);
        Ok(cache)
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        // A panic while holding the lock cannot leave the map half-updated,
        // so a poisoned lock is still usable.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Store calls happen after the state lock is released so lookups never
    // wait on disk.
    fn store_put(&self, entry: &CacheEntry) {
        if let Some(store) = &self.store {
            if let Err(err) = store.put(entry) {
                warn!("Cache: failed to persist '{}': {}", entry.key, err);
            }
        }
    }

    fn store_remove_all(&self, keys: &[String]) {
        let Some(store) = &self.store else {
            return;
        };
        for key in keys {
            if let Err(err) = store.remove(key) {
                warn!("Cache: failed to remove persisted '{}': {}", key, err);
            }
        }
    }

    /// Evicts lowest-scored entries other than `keep` until the cache fits.
    fn evict_to_capacity(&self, state: &mut CacheState, keep: Option<&str>) -> Vec<String> {
        let hit_weight_ms = duration_ms(self.settings.hit_weight);
        let mut evicted = Vec::new();
        while state.entries.len() > self.settings.capacity.max(1) {
            let Some(victim) = state
                .entries
                .values()
                .filter(|entry| Some(entry.key.as_str()) != keep)
                .min_by_key(|entry| {
                    (entry.eviction_score(hit_weight_ms), entry.inserted_at_unix_ms)
                })
                .map(|entry| entry.key.clone())
            else {
                break;
            };
            state.entries.remove(&victim);
            state.stats.evictions += 1;
            debug!("Cache: evicted '{}'", victim);
            evicted.push(victim);
        }
        evicted
    }

    pub fn get(&self, key: &str) -> Option<CandidateRecord> {
        self.get_at(key, unix_now_ms())
    }

    /// Looks up `key` as of `now_ms`. Expired entries are purged and reported as misses.
    ///
    /// Hits write the updated hit count and access time through to the store,
    /// so eviction order survives a restart.
    pub fn get_at(&self, key: &str, now_ms: u64) -> Option<CandidateRecord> {
        if !self.settings.enabled {
            return None;
        }
        let ttl_ms = duration_ms(self.settings.ttl);
        let touched = {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            match state.entries.get_mut(key) {
                None => {
                    state.stats.misses += 1;
                    return None;
                }
                Some(entry) if !entry.is_expired(now_ms, ttl_ms) => {
                    entry.hit_count = entry.hit_count.saturating_add(1);
                    entry.last_access_unix_ms = now_ms;
                    state.stats.hits += 1;
                    Some(entry.clone())
                }
                Some(_) => {
                    state.entries.remove(key);
                    state.stats.expirations += 1;
                    state.stats.misses += 1;
                    None
                }
            }
        };
        match touched {
            Some(entry) => {
                self.store_put(&entry);
                Some(entry.record)
            }
            None => {
                self.store_remove_all(&[key.to_string()]);
                None
            }
        }
    }

    pub fn set(&self, key: &str, record: CandidateRecord) {
        self.set_at(key, record, unix_now_ms());
    }

    /// Inserts or overwrites `key`, evicting the lowest-scored other entry when full.
    pub fn set_at(&self, key: &str, record: CandidateRecord, now_ms: u64) {
        if !self.settings.enabled {
            return;
        }
        let entry = CacheEntry {
            key: key.to_string(),
            record,
            inserted_at_unix_ms: now_ms,
            last_access_unix_ms: now_ms,
            hit_count: 0,
        };
        let evicted = {
            let mut state = self.lock_state();
            state.entries.insert(entry.key.clone(), entry.clone());
            self.evict_to_capacity(&mut state, Some(key))
        };
        self.store_put(&entry);
        self.store_remove_all(&evicted);
    }

    pub fn remove(&self, key: &str) -> bool {
        let removed = self.lock_state().entries.remove(key).is_some();
        if removed {
            self.store_remove_all(&[key.to_string()]);
        }
        removed
    }

    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(unix_now_ms())
    }

    pub fn purge_expired_at(&self, now_ms: u64) -> usize {
        let ttl_ms = duration_ms(self.settings.ttl);
        let expired: Vec<String> = {
            let mut state = self.lock_state();
            let expired: Vec<String> = state
                .entries
                .values()
                .filter(|entry| entry.is_expired(now_ms, ttl_ms))
                .map(|entry| entry.key.clone())
                .collect();
            for key in &expired {
                state.entries.remove(key);
            }
            state.stats.expirations += expired.len() as u64;
            expired
        };
        self.store_remove_all(&expired);
        expired.len()
    }

    /// Drops every entry, including persisted ones. Returns how many were held in memory.
    pub fn clear(&self) -> usize {
        let cleared = {
            let mut state = self.lock_state();
            let cleared = state.entries.len();
            state.entries.clear();
            cleared
        };
        if let Some(store) = &self.store {
            if let Err(err) = store.clear() {
                warn!("Cache: failed to clear persisted entries: {}", err);
            }
        }
        cleared
    }

    pub fn len(&self) -> usize {
        self.lock_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock_state();
        CacheStats {
            entries: state.entries.len(),
            ..state.stats
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}
