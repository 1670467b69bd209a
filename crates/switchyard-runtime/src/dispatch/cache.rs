//! Result cache for dispatched commands.
//!
//! Keys are deterministic over `(command, params, user, priority)`,
//! so a repeat of the same request by the same user within the TTL is
//! served from here without touching the module. Capacity is bounded;
//! the least recently accessed entry is evicted first.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use switchyard_types::Priority;
use tracing::debug;

struct CacheEntry {
    data: Value,
    stored_at: Instant,
    last_accessed: Instant,
    hits: u64,
}

pub(crate) struct CommandCache {
    ttl: Duration,
    cap: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl CommandCache {
    pub(crate) fn new(ttl: Duration, cap: usize) -> Self {
        Self {
            ttl,
            cap,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Builds the cache identity of one request. Session and metadata
    /// are deliberately excluded; they do not change the result.
    pub(crate) fn key(
        command: &str,
        params: &Value,
        user_id: Option<&str>,
        priority: Priority,
    ) -> String {
        format!(
            "{}|{}|{}|{}",
            command,
            params,
            user_id.unwrap_or("-"),
            priority.name()
        )
    }

    /// Looks up a fresh entry, bumping its hit count and recency. An
    /// entry past the TTL is removed and reported as a miss.
    pub(crate) fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(key)?;
        if entry.stored_at.elapsed() >= self.ttl {
            entries.remove(key);
            return None;
        }
        entry.hits += 1;
        entry.last_accessed = Instant::now();
        Some(entry.data.clone())
    }

    /// Stores a successful result. At capacity, the least recently
    /// accessed entry makes room. A zero cap disables caching.
    pub(crate) fn put(&self, key: String, data: Value) {
        if self.cap == 0 {
            return;
        }
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if !entries.contains_key(&key) && entries.len() >= self.cap {
            let coldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_accessed)
                .map(|(key, _)| key.clone());
            if let Some(coldest) = coldest {
                debug!(key = %coldest, "evicting cache entry");
                entries.remove(&coldest);
            }
        }
        entries.insert(
            key,
            CacheEntry {
                data,
                stored_at: now,
                last_accessed: now,
                hits: 0,
            },
        );
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread::sleep;

    fn cache() -> CommandCache {
        CommandCache::new(Duration::from_secs(300), 500)
    }

    // ── Keys ────────────────────────────────────────────────

    #[test]
    fn key_covers_the_full_identity() {
        let base = CommandCache::key("a:b", &json!({"x": 1}), Some("u1"), Priority::Medium);
        assert_ne!(
            base,
            CommandCache::key("a:c", &json!({"x": 1}), Some("u1"), Priority::Medium)
        );
        assert_ne!(
            base,
            CommandCache::key("a:b", &json!({"x": 2}), Some("u1"), Priority::Medium)
        );
        assert_ne!(
            base,
            CommandCache::key("a:b", &json!({"x": 1}), Some("u2"), Priority::Medium)
        );
        assert_ne!(
            base,
            CommandCache::key("a:b", &json!({"x": 1}), Some("u1"), Priority::Low)
        );
        assert_ne!(
            base,
            CommandCache::key("a:b", &json!({"x": 1}), None, Priority::Medium)
        );
    }

    #[test]
    fn key_ignores_object_key_order() {
        let a = CommandCache::key("a:b", &json!({"x": 1, "y": 2}), None, Priority::Medium);
        let b = CommandCache::key("a:b", &json!({"y": 2, "x": 1}), None, Priority::Medium);
        assert_eq!(a, b);
    }

    // ── Hits and expiry ─────────────────────────────────────

    #[test]
    fn hit_within_ttl_returns_stored_value() {
        let cache = cache();
        cache.put("k".into(), json!({"n": 1}));

        assert_eq!(cache.get("k"), Some(json!({"n": 1})));
        assert_eq!(cache.get("k"), Some(json!({"n": 1})));
        assert_eq!(cache.entries.lock()["k"].hits, 2);
    }

    #[test]
    fn entry_past_ttl_misses_and_is_dropped() {
        let cache = CommandCache::new(Duration::from_millis(20), 500);
        cache.put("k".into(), json!(1));
        assert_eq!(cache.get("k"), Some(json!(1)));

        sleep(Duration::from_millis(40));
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn unknown_key_misses() {
        assert_eq!(cache().get("nope"), None);
    }

    // ── Eviction ────────────────────────────────────────────

    #[test]
    fn eviction_removes_least_recently_accessed() {
        let cache = CommandCache::new(Duration::from_secs(300), 2);
        cache.put("a".into(), json!(1));
        sleep(Duration::from_millis(2));
        cache.put("b".into(), json!(2));
        sleep(Duration::from_millis(2));

        // Touch "a" so "b" becomes the coldest entry.
        cache.get("a");
        sleep(Duration::from_millis(2));
        cache.put("c".into(), json!(3));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(json!(1)));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("c"), Some(json!(3)));
    }

    #[test]
    fn replacing_a_key_does_not_evict() {
        let cache = CommandCache::new(Duration::from_secs(300), 2);
        cache.put("a".into(), json!(1));
        cache.put("b".into(), json!(2));
        cache.put("a".into(), json!(10));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(json!(10)));
        assert_eq!(cache.get("b"), Some(json!(2)));
    }
}
