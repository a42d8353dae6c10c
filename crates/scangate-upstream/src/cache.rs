//! Bounded TTL cache keyed by content fingerprint.
//!
//! Entries expire `ttl` after insertion and are reclaimed lazily on lookup.
//! When full, inserting a new key evicts exactly one entry: the oldest by
//! insertion order.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use metrics::counter;
use parking_lot::Mutex;
use scangate_settings::CacheSettings;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::fingerprint::Fingerprint;

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<Fingerprint, CacheEntry>,
    order: VecDeque<Fingerprint>,
    hits: u64,
    misses: u64,
}

impl CacheInner {
    fn forget(&mut self, key: &Fingerprint) {
        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
        }
    }
}

/// Snapshot of cache state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Stored entries, including expired ones not yet reclaimed.
    pub count: usize,
    /// Whether the cache is active.
    pub enabled: bool,
    /// Capacity.
    pub max_size: usize,
    /// Entry lifetime.
    pub ttl_secs: u64,
    /// Lookups that returned a value.
    pub hits: u64,
    /// Lookups that did not.
    pub misses: u64,
}

/// Fingerprint-keyed memoization of upstream results.
pub struct FingerprintCache {
    enabled: bool,
    ttl: Duration,
    max_size: usize,
    inner: Mutex<CacheInner>,
}

impl FingerprintCache {
    /// Create a cache from settings.
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            enabled: settings.enabled && settings.max_size > 0,
            ttl: Duration::from_secs(settings.ttl_secs),
            max_size: settings.max_size,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Whether lookups can ever hit.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Look up a live entry. Expired entries count as a miss and are dropped.
    pub fn get(&self, key: &Fingerprint) -> Option<Value> {
        if !self.enabled {
            return None;
        }
        let mut inner = self.inner.lock();
        let now = Instant::now();
        if inner.entries.get(key).is_some_and(|e| e.expires_at <= now) {
            inner.forget(key);
            debug!(fingerprint = %key, "cache entry expired");
        }
        let live = inner.entries.get(key).map(|e| e.value.clone());
        if live.is_some() {
            inner.hits += 1;
            counter!("cache_hits_total").increment(1);
        } else {
            inner.misses += 1;
            counter!("cache_misses_total").increment(1);
        }
        live
    }

    /// Store a value. Replacing a key refreshes its expiry and position.
    pub fn set(&self, key: Fingerprint, value: Value) {
        if !self.enabled {
            return;
        }
        let mut inner = self.inner.lock();
        inner.forget(&key);
        if inner.entries.len() >= self.max_size {
            if let Some(oldest) = inner.order.pop_front() {
                let _ = inner.entries.remove(&oldest);
                debug!(fingerprint = %oldest, "cache evicted oldest entry");
            }
        }
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + self.ttl,
        };
        let _ = inner.entries.insert(key.clone(), entry);
        inner.order.push_back(key);
    }

    /// Drop every entry and reset counters. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let dropped = inner.entries.len();
        *inner = CacheInner::default();
        dropped
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            count: inner.entries.len(),
            enabled: self.enabled,
            max_size: self.max_size,
            ttl_secs: self.ttl.as_secs(),
            hits: inner.hits,
            misses: inner.misses,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use crate::types::{ScanContent, ScanProfile};
    use serde_json::json;

    fn key(n: usize) -> Fingerprint {
        let content = ScanContent {
            prompt: Some(format!("prompt-{n}")),
            ..ScanContent::default()
        };
        fingerprint(&ScanProfile::Name("p".into()), &[content]).unwrap()
    }

    fn cache(ttl_secs: u64, max_size: usize) -> FingerprintCache {
        FingerprintCache::new(&CacheSettings {
            enabled: true,
            ttl_secs,
            max_size,
        })
    }

    #[test]
    fn set_then_get() {
        let c = cache(60, 10);
        c.set(key(1), json!({"verdict": "benign"}));
        assert_eq!(c.get(&key(1)), Some(json!({"verdict": "benign"})));
        assert_eq!(c.get(&key(2)), None);
        let stats = c.stats();
        assert_eq!((stats.hits, stats.misses, stats.count), (1, 1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_a_miss_and_reclaimed() {
        let c = cache(5, 10);
        c.set(key(1), json!(1));
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(c.get(&key(1)).is_some());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(c.get(&key(1)).is_none());
        assert_eq!(c.stats().count, 0);
    }

    #[test]
    fn full_cache_evicts_exactly_one_oldest() {
        let c = cache(60, 3);
        for n in 0..3 {
            c.set(key(n), json!(n));
        }
        c.set(key(3), json!(3));
        assert_eq!(c.stats().count, 3);
        assert!(c.get(&key(0)).is_none());
        for n in 1..=3 {
            assert_eq!(c.get(&key(n)), Some(json!(n)));
        }
    }

    #[test]
    fn reads_do_not_change_eviction_order() {
        let c = cache(60, 2);
        c.set(key(0), json!(0));
        c.set(key(1), json!(1));
        let _ = c.get(&key(0));
        c.set(key(2), json!(2));
        assert!(c.get(&key(0)).is_none());
        assert!(c.get(&key(1)).is_some());
    }

    #[test]
    fn overwrite_does_not_grow() {
        let c = cache(60, 2);
        c.set(key(0), json!("a"));
        c.set(key(0), json!("b"));
        assert_eq!(c.stats().count, 1);
        assert_eq!(c.get(&key(0)), Some(json!("b")));
    }

    #[test]
    fn never_exceeds_max_size() {
        let c = cache(60, 5);
        for n in 0..50 {
            c.set(key(n), json!(n));
            assert!(c.stats().count <= 5);
        }
    }

    #[test]
    fn disabled_cache_always_misses() {
        let c = FingerprintCache::new(&CacheSettings {
            enabled: false,
            ttl_secs: 60,
            max_size: 10,
        });
        c.set(key(1), json!(1));
        assert!(c.get(&key(1)).is_none());
        let stats = c.stats();
        assert!(!stats.enabled);
        assert_eq!(stats.count, 0);
    }

    #[test]
    fn clear_drops_entries_and_counters() {
        let c = cache(60, 10);
        c.set(key(1), json!(1));
        c.set(key(2), json!(2));
        let _ = c.get(&key(1));
        assert_eq!(c.clear(), 2);
        let stats = c.stats();
        assert_eq!((stats.count, stats.hits, stats.misses), (0, 0, 0));
    }

    #[test]
    fn stats_serialize_camel_case() {
        let json = serde_json::to_value(cache(300, 1000).stats()).unwrap();
        assert_eq!(json["maxSize"], 1000);
        assert_eq!(json["ttlSecs"], 300);
    }
}
