//! # Host Resolution Cache
//!
//! Every HTTP request carries a `Host` header that must be mapped to a
//! tenant. The mapping lives in the registry database; this LRU keeps the hot
//! hosts in memory, including misses, so unknown hosts do not hit the
//! registry on every request.
//!
//! Recency is tracked with a logical clock (monotonic counter) rather than
//! wall time, which keeps eviction order reproducible in tests.

use crate::tenant::TenantId;
use std::collections::BTreeMap;

/// Default number of hosts kept in memory.
pub const DEFAULT_CACHE_SIZE: usize = 1024;

/// Default number of entries evicted when the cache is full.
pub const DEFAULT_EVICTION_BATCH: usize = 64;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    last_access: u64,
}

/// Bounded LRU map with batch eviction.
#[derive(Debug)]
pub struct LruCache<K: Ord + Clone, V: Clone> {
    entries: BTreeMap<K, CacheEntry<V>>,
    max_size: usize,
    eviction_batch: usize,
    logical_clock: u64,
    hits: u64,
    misses: u64,
}

impl<K: Ord + Clone, V: Clone> Default for LruCache<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

impl<K: Ord + Clone, V: Clone> LruCache<K, V> {
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            max_size: max_size.max(1),
            eviction_batch: DEFAULT_EVICTION_BATCH,
            logical_clock: 0,
            hits: 0,
            misses: 0,
        }
    }

    #[must_use]
    pub fn with_eviction_batch(mut self, batch_size: usize) -> Self {
        self.eviction_batch = batch_size.max(1);
        self
    }

    /// Look up a key, refreshing its recency on hit.
    pub fn get(&mut self, key: &K) -> Option<V> {
        self.logical_clock = self.logical_clock.saturating_add(1);
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_access = self.logical_clock;
                self.hits = self.hits.saturating_add(1);
                Some(entry.value.clone())
            }
            None => {
                self.misses = self.misses.saturating_add(1);
                None
            }
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.logical_clock = self.logical_clock.saturating_add(1);
        if self.entries.len() >= self.max_size && !self.entries.contains_key(&key) {
            self.evict();
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                last_access: self.logical_clock,
            },
        );
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    /// Drop every entry. Statistics survive.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let total = self.hits.saturating_add(self.misses);
        let hit_rate_percent = if total == 0 {
            0
        } else {
            (self.hits.saturating_mul(100) / total) as u8
        };
        CacheStats {
            size: self.entries.len(),
            max_size: self.max_size,
            hits: self.hits,
            misses: self.misses,
            hit_rate_percent,
        }
    }

    fn evict(&mut self) {
        let to_evict = self.eviction_batch.min(self.entries.len());
        let mut by_access: Vec<(u64, K)> = self
            .entries
            .iter()
            .map(|(key, entry)| (entry.last_access, key.clone()))
            .collect();
        by_access.sort_by_key(|(access, _)| *access);

        for (_, key) in by_access.into_iter().take(to_evict) {
            self.entries.remove(&key);
        }
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    /// Hit rate as integer percentage (0-100).
    pub hit_rate_percent: u8,
}

/// Host name -> tenant. `None` records a known miss.
pub type HostCache = LruCache<String, Option<TenantId>>;
