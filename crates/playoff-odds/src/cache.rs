// In-process TTL cache for aggregated results.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created: Instant,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created) < ttl
    }
}

/// Map from key to value, each valid for `ttl` after insertion.
///
/// Lookups share the read lock; inserts and invalidations take the write
/// lock. Callers never hold either across a simulation run.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh value for `key`, if any. Expired entries are left for
    /// `purge_expired`.
    pub fn get(&self, key: &str) -> Option<V> {
        self.lookup_at(key, Instant::now())
    }

    pub(crate) fn lookup_at(&self, key: &str, now: Instant) -> Option<V> {
        let entries = self.read();
        match entries.get(key) {
            Some(entry) if entry.is_fresh(now, self.ttl) => {
                debug!("cache hit for {key}");
                Some(entry.value.clone())
            }
            Some(_) => {
                debug!("cache entry for {key} expired");
                None
            }
            None => {
                debug!("cache miss for {key}");
                None
            }
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub(crate) fn insert_at(&self, key: impl Into<String>, value: V, created: Instant) {
        self.write()
            .insert(key.into(), CacheEntry { value, created });
    }

    /// Remove one entry. Returns whether anything was removed.
    pub fn invalidate(&self, key: &str) -> bool {
        self.write().remove(key).is_some()
    }

    pub fn invalidate_all(&self) {
        self.write().clear();
    }

    /// Drop every expired entry and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub(crate) fn purge_expired_at(&self, now: Instant) -> usize {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now, self.ttl));
        before - entries.len()
    }

    /// Number of stored entries, fresh or not.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Poisoning is ignored: each critical section is a single map operation.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}
