//! TTL + LRU cache for full query outputs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug)]
struct CacheEntry {
    data: Value,
    inserted_at: Instant,
    hits: AtomicU64,
}

/// Cache statistics snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub total_hits: u64,
    /// Approximation: hits / (hits + entries). Raw counters are exposed
    /// alongside so observability can compute its own rate.
    pub hit_rate: f64,
    pub oldest_age_seconds: f64,
    pub max_entries: usize,
    pub ttl_seconds: u64,
}

/// Response cache keyed by query fingerprint. Reads are lock-free on
/// hit; eviction scans under the shard locks.
#[derive(Debug)]
pub struct ContextCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    max_entries: usize,
}

impl ContextCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Return the cached value if present and unexpired. Expired entries
    /// are deleted on access and count as a miss.
    pub fn get(&self, key: &str) -> Option<Value> {
        let expired = {
            let entry = self.entries.get(key)?;
            if entry.inserted_at.elapsed() > self.ttl {
                true
            } else {
                entry.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.data.clone());
            }
        };
        if expired {
            debug!(key, "cache entry expired");
            self.entries.remove(key);
        }
        None
    }

    /// Insert a value, evicting the oldest entry (tie-break: lowest hit
    /// count) when at capacity.
    pub fn put(&self, key: String, data: Value) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.evict_one();
        }
        self.entries.insert(
            key,
            CacheEntry {
                data,
                inserted_at: Instant::now(),
                hits: AtomicU64::new(0),
            },
        );
    }

    fn evict_one(&self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| (entry.inserted_at, entry.hits.load(Ordering::Relaxed)))
            .map(|entry| entry.key().clone());
        if let Some(key) = victim {
            debug!(key = %key, "evicting cache entry");
            self.entries.remove(&key);
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drop all expired entries, returning how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.inserted_at.elapsed() > self.ttl)
            .map(|entry| entry.key().clone())
            .collect();
        let count = expired.len();
        for key in expired {
            self.entries.remove(&key);
        }
        count
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.len();
        let mut total_hits = 0u64;
        let mut oldest_age = 0f64;
        for entry in self.entries.iter() {
            total_hits += entry.hits.load(Ordering::Relaxed);
            oldest_age = oldest_age.max(entry.inserted_at.elapsed().as_secs_f64());
        }
        let hit_rate = if total_hits > 0 {
            total_hits as f64 / (total_hits + entries as u64) as f64
        } else {
            0.0
        };
        CacheStats {
            entries,
            total_hits,
            hit_rate,
            oldest_age_seconds: oldest_age,
            max_entries: self.max_entries,
            ttl_seconds: self.ttl.as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_after_put_within_ttl() {
        let cache = ContextCache::new(Duration::from_secs(60), 10);
        cache.put("k".to_string(), json!({"a": 1}));
        assert_eq!(cache.get("k"), Some(json!({"a": 1})));
        assert_eq!(cache.stats().total_hits, 1);
    }

    #[test]
    fn expired_entries_miss_and_are_deleted() {
        let cache = ContextCache::new(Duration::from_millis(10), 10);
        cache.put("k".to_string(), json!(1));
        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn put_at_capacity_evicts_exactly_one() {
        let cache = ContextCache::new(Duration::from_secs(60), 2);
        cache.put("first".to_string(), json!(1));
        std::thread::sleep(Duration::from_millis(5));
        cache.put("second".to_string(), json!(2));
        // Touch the oldest so only recency decides.
        std::thread::sleep(Duration::from_millis(5));
        cache.put("third".to_string(), json!(3));

        assert_eq!(cache.stats().entries, 2);
        assert_eq!(cache.get("first"), None);
        assert!(cache.get("second").is_some());
        assert!(cache.get("third").is_some());
    }

    #[test]
    fn cleanup_removes_only_expired() {
        let cache = ContextCache::new(Duration::from_millis(20), 10);
        cache.put("old".to_string(), json!(1));
        std::thread::sleep(Duration::from_millis(25));
        cache.put("new".to_string(), json!(2));
        assert_eq!(cache.cleanup_expired(), 1);
        assert!(cache.get("new").is_some());
    }

    #[test]
    fn stats_on_empty_cache() {
        let cache = ContextCache::new(Duration::from_secs(300), 1000);
        let stats = cache.stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.total_hits, 0);
        assert_eq!(stats.hit_rate, 0.0);
    }
}
