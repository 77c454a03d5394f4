//! TTL read cache.
//!
//! Entries expire when `now - timestamp > ttl` and are evicted lazily on the
//! next lookup, never by a background sweep. When the cache is full, the
//! entry inserted earliest is evicted (insertion order, not access order);
//! re-setting an existing key refreshes its data and timestamp but keeps its
//! place in that order.
//!
//! Hit/miss counters are monotonic for the lifetime of the cache; `clear`
//! drops entries but not counters.

use crate::{clock::SharedClock, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Default time-to-live: five minutes.
pub const DEFAULT_TTL_MS: u64 = 5 * 60 * 1000;

/// Default maximum number of entries.
pub const DEFAULT_CAPACITY: usize = 100;

/// A cached value with its freshness data.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub key: String,
    pub data: V,
    pub timestamp: Timestamp,
    pub ttl: u64,
    seq: u64,
}

impl<V> CacheEntry<V> {
    /// Whether the entry is stale at `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now.saturating_sub(self.timestamp) > self.ttl
    }
}

/// Hit/miss accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, 0.0 before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A bounded cache with per-entry TTL.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Insertion sequence -> key, oldest first
    order: BTreeMap<u64, String>,
    next_seq: u64,
    capacity: usize,
    default_ttl: u64,
    clock: SharedClock,
    stats: CacheStats,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache with the default TTL and capacity.
    pub fn new(clock: SharedClock) -> Self {
        Self::with_limits(clock, DEFAULT_TTL_MS, DEFAULT_CAPACITY)
    }

    /// Create a cache with explicit limits. A capacity of zero means unbounded.
    pub fn with_limits(clock: SharedClock, default_ttl: u64, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
            capacity,
            default_ttl,
            clock,
            stats: CacheStats::default(),
        }
    }

    /// Store a value. `ttl` defaults to the cache's default TTL.
    pub fn set(&mut self, key: impl Into<String>, data: V, ttl: Option<u64>) {
        let key = key.into();
        let now = self.clock.now_millis();
        let ttl = ttl.unwrap_or(self.default_ttl);

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.data = data;
            entry.timestamp = now;
            entry.ttl = ttl;
            return;
        }

        if self.capacity > 0 && self.entries.len() >= self.capacity {
            self.evict_oldest();
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key.clone());
        self.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                data,
                timestamp: now,
                ttl,
                seq,
            },
        );
    }

    /// Look up a fresh value, counting a hit or a miss.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let now = self.clock.now_millis();
        let expired = match self.entries.get(key) {
            None => {
                self.stats.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            self.remove(key);
            self.stats.misses += 1;
            return None;
        }

        self.stats.hits += 1;
        self.entries.get(key).map(|entry| entry.data.clone())
    }

    /// Look at an entry without counting or evicting.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    /// Drop one key. Returns whether it was present.
    pub fn invalidate(&mut self, key: &str) -> bool {
        self.remove(key).is_some()
    }

    /// Drop every key starting with `prefix`. Returns how many were dropped.
    pub fn invalidate_prefix(&mut self, prefix: &str) -> usize {
        let keys: Vec<String> = self
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        for key in &keys {
            self.remove(key);
        }
        keys.len()
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Number of stored entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    fn evict_oldest(&mut self) {
        if let Some((_, key)) = self.order.pop_first() {
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn cache(ttl: u64, capacity: usize) -> (TtlCache<&'static str>, ManualClock) {
        let clock = ManualClock::new(0);
        (
            TtlCache::with_limits(Arc::new(clock.clone()), ttl, capacity),
            clock,
        )
    }

    #[test]
    fn fresh_until_ttl_elapses() {
        let (mut cache, clock) = cache(DEFAULT_TTL_MS, 10);
        cache.set("k", "v", Some(100));

        clock.set(99);
        assert_eq!(cache.get("k"), Some("v"));
        clock.set(100);
        assert_eq!(cache.get("k"), Some("v"));
        clock.set(101);
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn expired_entry_is_evicted_lazily() {
        let (mut cache, clock) = cache(50, 10);
        cache.set("k", "v", None);
        clock.advance(51);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn counts_hits_and_misses() {
        let (mut cache, clock) = cache(10, 10);
        cache.set("a", "1", None);

        cache.get("a");
        cache.get("a");
        cache.get("missing");
        clock.advance(11);
        cache.get("a");

        let stats = cache.stats();
        assert_eq!(stats, CacheStats { hits: 2, misses: 2 });
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn clear_keeps_counters() {
        let (mut cache, _) = cache(10, 10);
        cache.set("a", "1", None);
        cache.get("a");
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn evicts_in_insertion_order() {
        let (mut cache, _) = cache(1_000, 2);
        cache.set("a", "1", None);
        cache.set("b", "2", None);

        // Reading "a" does not protect it: eviction ignores access order.
        assert_eq!(cache.get("a"), Some("1"));
        cache.set("c", "3", None);

        assert!(cache.peek("a").is_none());
        assert!(cache.peek("b").is_some());
        assert!(cache.peek("c").is_some());
    }

    #[test]
    fn reset_keeps_insertion_position() {
        let (mut cache, clock) = cache(1_000, 2);
        cache.set("a", "1", None);
        cache.set("b", "2", None);
        clock.advance(5);
        cache.set("a", "1b", None);
        cache.set("c", "3", None);

        assert!(cache.peek("a").is_none());
        assert_eq!(cache.peek("b").map(|e| e.data), Some("2"));
    }

    #[test]
    fn reset_refreshes_timestamp() {
        let (mut cache, clock) = cache(100, 10);
        cache.set("a", "1", None);
        clock.advance(90);
        cache.set("a", "2", None);
        clock.advance(90);

        assert_eq!(cache.get("a"), Some("2"));
    }

    #[test]
    fn invalidate_prefix() {
        let (mut cache, _) = cache(1_000, 10);
        cache.set("clients:all", "1", None);
        cache.set("clients:{\"owner\":\"u-1\"}", "2", None);
        cache.set("tasks:all", "3", None);

        assert_eq!(cache.invalidate_prefix("clients:"), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.invalidate("tasks:all"));
        assert!(!cache.invalidate("tasks:all"));
    }

    #[test]
    fn zero_capacity_is_unbounded() {
        let (mut cache, _) = cache(1_000, 0);
        for i in 0..500 {
            cache.set(format!("k{}", i), "v", None);
        }
        assert_eq!(cache.len(), 500);
    }
}
