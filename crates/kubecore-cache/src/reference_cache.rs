//! Short-TTL memoization of "resources referencing (name, namespace)
//! via field F", used inside the transitive engine.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone)]
struct CachedReferences {
    items: Vec<Value>,
    cached_at: Instant,
}

/// Bounded cache of back-reference search results.
#[derive(Debug)]
pub struct ReferenceCache {
    entries: DashMap<String, CachedReferences>,
    ttl: Duration,
    max_entries: usize,
}

impl Default for ReferenceCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300), 100)
    }
}

impl ReferenceCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    fn key(ref_field: &str, name: &str, namespace: Option<&str>) -> String {
        format!("{}:{}:{}", ref_field, name, namespace.unwrap_or("\u{2205}"))
    }

    pub fn get(&self, ref_field: &str, name: &str, namespace: Option<&str>) -> Option<Vec<Value>> {
        let key = Self::key(ref_field, name, namespace);
        let expired = {
            let entry = self.entries.get(&key)?;
            if entry.cached_at.elapsed() > self.ttl {
                true
            } else {
                return Some(entry.items.clone());
            }
        };
        if expired {
            self.entries.remove(&key);
        }
        None
    }

    pub fn put(&self, ref_field: &str, name: &str, namespace: Option<&str>, items: Vec<Value>) {
        let key = Self::key(ref_field, name, namespace);
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            // Close to LRU under sustained load, but keyed on insertion
            // age rather than access age.
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.cached_at)
                .map(|entry| entry.key().clone());
            if let Some(oldest) = oldest {
                debug!(key = %oldest, "evicting intermediate cache entry");
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(
            key,
            CachedReferences {
                items,
                cached_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Rough serialized-size accounting of cached values, in bytes.
    pub fn estimated_bytes(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| {
                entry
                    .items
                    .iter()
                    .map(|item| item.to_string().len())
                    .sum::<usize>()
                    + 64
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hit_within_ttl_miss_after() {
        let cache = ReferenceCache::new(Duration::from_millis(20), 10);
        cache.put("kubenvRef", "demo-dev", Some("test"), vec![json!({"n": 1})]);
        assert_eq!(
            cache.get("kubenvRef", "demo-dev", Some("test")),
            Some(vec![json!({"n": 1})])
        );
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(cache.get("kubenvRef", "demo-dev", Some("test")), None);
    }

    #[test]
    fn namespace_is_part_of_the_key() {
        let cache = ReferenceCache::default();
        cache.put("kubenvRef", "demo-dev", Some("a"), vec![json!(1)]);
        assert_eq!(cache.get("kubenvRef", "demo-dev", Some("b")), None);
        assert_eq!(cache.get("kubenvRef", "demo-dev", None), None);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let cache = ReferenceCache::new(Duration::from_secs(60), 2);
        cache.put("f", "first", None, vec![]);
        std::thread::sleep(Duration::from_millis(5));
        cache.put("f", "second", None, vec![]);
        std::thread::sleep(Duration::from_millis(5));
        cache.put("f", "third", None, vec![]);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("f", "first", None), None);
        assert!(cache.get("f", "third", None).is_some());
    }
}
