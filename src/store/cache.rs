//! Short-TTL response cache.
//!
//! An entry is served only while `now - fetched_at < ttl`. Expired entries
//! are misses; they are removed on lookup or by [`ResponseCache::purge_expired`],
//! which the background maintenance task calls periodically.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::clock::{SharedClock, millis};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    payload: V,
    fetched_at: u64,
    ttl_ms: u64,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: u64) -> bool {
        now.saturating_sub(self.fetched_at) < self.ttl_ms
    }
}

/// TTL cache keyed by normalized request parameters. Cheap to clone.
#[derive(Clone, Debug)]
pub struct ResponseCache<V> {
    inner: Arc<CacheInner<V>>,
}

#[derive(Debug)]
struct CacheInner<V> {
    entries: DashMap<String, CacheEntry<V>>,
    default_ttl: Duration,
    clock: SharedClock,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(default_ttl: Duration, clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: DashMap::new(),
                default_ttl,
                clock,
            }),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.inner.default_ttl
    }

    /// Look up a fresh entry.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.inner.clock.now_millis();

        {
            let entry = self.inner.entries.get(key)?;
            if entry.is_fresh(now) {
                return Some(entry.payload.clone());
            }
        }

        // A concurrent `set` may have refreshed it in between.
        self.inner
            .entries
            .remove_if(key, |_, entry| !entry.is_fresh(now));
        None
    }

    /// Store `payload` under `key` for `ttl`, replacing any previous entry.
    pub fn set(&self, key: impl Into<String>, payload: V, ttl: Duration) {
        let entry = CacheEntry {
            payload,
            fetched_at: self.inner.clock.now_millis(),
            ttl_ms: millis(ttl),
        };
        self.inner.entries.insert(key.into(), entry);
    }

    /// Store `payload` with the cache's default TTL.
    pub fn insert(&self, key: impl Into<String>, payload: V) {
        self.set(key, payload, self.inner.default_ttl);
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.inner.clock.now_millis();
        let before = self.inner.entries.len();
        self.inner.entries.retain(|_, entry| entry.is_fresh(now));
        before.saturating_sub(self.inner.entries.len())
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn cache() -> (ResponseCache<String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(10_000));
        (ResponseCache::new(Duration::from_secs(300), clock.clone()), clock)
    }

    #[test]
    fn test_hit_before_ttl() {
        let (cache, clock) = cache();
        cache.set("k", "v".to_string(), Duration::from_secs(300));

        clock.advance(Duration::from_secs(299));
        assert_eq!(cache.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_miss_at_and_after_ttl() {
        let (cache, clock) = cache();
        cache.set("k", "v".to_string(), Duration::from_secs(300));

        clock.advance(Duration::from_secs(300));
        assert!(cache.get("k").is_none());
        // expired entry is dropped on lookup
        assert!(cache.is_empty());
    }

    #[test]
    fn test_miss_for_unknown_key() {
        let (cache, _clock) = cache();
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn test_set_after_expiry_replaces_entry() {
        let (cache, clock) = cache();
        cache.insert("k", "old".to_string());
        clock.advance(Duration::from_secs(400));
        assert!(cache.get("k").is_none());

        cache.insert("k", "new".to_string());
        clock.advance(Duration::from_secs(10));
        assert_eq!(cache.get("k").as_deref(), Some("new"));
    }

    #[test]
    fn test_set_overwrites_fresh_entry() {
        let (cache, _clock) = cache();
        cache.insert("k", "first".to_string());
        cache.insert("k", "second".to_string());
        assert_eq!(cache.get("k").as_deref(), Some("second"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_purge_expired() {
        let (cache, clock) = cache();
        cache.set("short", "a".to_string(), Duration::from_secs(10));
        cache.set("long", "b".to_string(), Duration::from_secs(600));

        clock.advance(Duration::from_secs(60));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("long").is_some());
    }
}
