use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct CacheEntry<V> {
    value: Arc<V>,
    expires_at: Instant,
}

/// A TTL cache with copy-on-write entries: values are stored behind `Arc`
/// and replaced wholesale, never mutated in place. Expiry is checked on read,
/// so no sweeper task is needed; an expired entry is never returned.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K: Eq + Hash + Clone, V> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(Arc::clone(&entry.value)),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.entries.lock().unwrap().insert(
            key,
            CacheEntry {
                value: Arc::clone(&value),
                expires_at: Instant::now() + self.ttl,
            },
        );
        value
    }

    /// Best-effort removal; absent keys are fine.
    pub fn invalidate(&self, key: &K) {
        self.entries.lock().unwrap().remove(key);
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_within_ttl() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("k", 7u32);
        assert_eq!(*cache.get(&"k").unwrap(), 7);
    }

    #[test]
    fn expired_entries_are_never_returned() {
        let cache = TtlCache::new(Duration::from_millis(10));
        cache.insert("k", 7u32);
        std::thread::sleep(Duration::from_millis(25));
        assert!(cache.get(&"k").is_none());
    }

    #[test]
    fn insert_replaces_entry() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let first = cache.insert("k", 1u32);
        cache.insert("k", 2u32);
        // The old Arc is still valid for holders; readers see the new value.
        assert_eq!(*first, 1);
        assert_eq!(*cache.get(&"k").unwrap(), 2);
    }

    #[test]
    fn invalidate_is_best_effort() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(60));
        cache.invalidate(&"absent"); // no panic, no error
        cache.insert("k", 1);
        cache.invalidate(&"k");
        assert!(cache.get(&"k").is_none());
    }
}
