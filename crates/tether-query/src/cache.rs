//! Time-keyed response cache.
//!
//! Two independent clocks apply to an entry: `stale_time` decides whether a
//! cached payload may be served instead of hitting the network, and
//! `cache_time` decides when the entry is dropped altogether.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::fingerprint::QueryFingerprint;

/// One cached payload.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    /// Response payload.
    pub payload: Value,
    /// When the payload was stored.
    pub stored_at: Instant,
    /// Insertion order; breaks `stored_at` ties.
    seq: u64,
}

impl CacheEntry {
    /// Time since the entry was stored.
    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }

    /// Whether the entry is younger than `stale_time`.
    pub fn is_fresh(&self, stale_time: Duration) -> bool {
        self.age() < stale_time
    }
}

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<QueryFingerprint, CacheEntry>,
    next_seq: u64,
}

/// Fingerprint → payload store.
#[derive(Debug, Default)]
pub struct RequestCache {
    inner: Mutex<Entries>,
}

impl RequestCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The entry for `fingerprint`, if cached.
    pub fn get(&self, fingerprint: &QueryFingerprint) -> Option<CacheEntry> {
        self.inner.lock().map.get(fingerprint).cloned()
    }

    /// Store `payload`, replacing any previous entry.
    pub fn set(&self, fingerprint: QueryFingerprint, payload: Value) {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let _ = inner.map.insert(
            fingerprint,
            CacheEntry {
                payload,
                stored_at: Instant::now(),
                seq,
            },
        );
    }

    /// Whether `entry` may be served without a network call.
    pub fn is_valid(entry: &CacheEntry, stale_time: Duration) -> bool {
        entry.is_fresh(stale_time)
    }

    /// Bring the cache within `max_size` entries and drop entries older than
    /// `cache_time`. Returns the number of entries removed.
    ///
    /// Oldest entries go first, so survivors are always the most recent.
    pub fn evict(&self, max_size: usize, cache_time: Duration) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.map.len();

        if inner.map.len() > max_size {
            let mut by_age: Vec<(Instant, u64, QueryFingerprint)> = inner
                .map
                .iter()
                .map(|(fp, e)| (e.stored_at, e.seq, fp.clone()))
                .collect();
            by_age.sort_unstable_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

            let excess = inner.map.len() - max_size;
            for (_, _, fp) in by_age.into_iter().take(excess) {
                let _ = inner.map.remove(&fp);
            }
        }

        inner.map.retain(|_, e| e.age() <= cache_time);

        let removed = before - inner.map.len();
        if removed > 0 {
            debug!(removed, remaining = inner.map.len(), "cache evicted");
        }
        removed
    }

    /// Drop one entry. Returns whether it existed.
    pub fn remove(&self, fingerprint: &QueryFingerprint) -> bool {
        self.inner.lock().map.remove(fingerprint).is_some()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.inner.lock().map.clear();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().map.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::request::RequestSpec;

    fn fp(n: usize) -> QueryFingerprint {
        QueryFingerprint::of(&RequestSpec::get(format!("items/{n}")))
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn get_returns_latest_set() {
        let cache = RequestCache::new();
        assert!(cache.get(&fp(1)).is_none());
        cache.set(fp(1), json!("first"));
        cache.set(fp(1), json!("second"));
        assert_eq!(cache.get(&fp(1)).unwrap().payload, json!("second"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evicting_101_entries_to_100_drops_the_oldest() {
        let cache = RequestCache::new();
        for n in 0..101 {
            cache.set(fp(n), json!(n));
        }

        assert_eq!(cache.evict(100, HOUR), 1);
        assert_eq!(cache.len(), 100);
        assert!(cache.get(&fp(0)).is_none());
        assert!(cache.get(&fp(1)).is_some());
        assert!(cache.get(&fp(100)).is_some());
    }

    #[test]
    fn overwrite_refreshes_eviction_order() {
        let cache = RequestCache::new();
        cache.set(fp(0), json!(0));
        cache.set(fp(1), json!(1));
        cache.set(fp(0), json!("again"));

        assert_eq!(cache.evict(1, HOUR), 1);
        assert!(cache.get(&fp(0)).is_some());
        assert!(cache.get(&fp(1)).is_none());
    }

    #[test]
    fn evict_within_bound_is_noop() {
        let cache = RequestCache::new();
        cache.set(fp(0), json!(0));
        assert_eq!(cache.evict(10, HOUR), 0);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn staleness_follows_stale_time() {
        let cache = RequestCache::new();
        cache.set(fp(0), json!(0));

        tokio::time::advance(Duration::from_millis(400)).await;
        let entry = cache.get(&fp(0)).unwrap();
        assert!(RequestCache::is_valid(&entry, Duration::from_millis(500)));

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(!RequestCache::is_valid(&entry, Duration::from_millis(500)));
        assert!(!RequestCache::is_valid(&entry, Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn evict_purges_entries_past_cache_time() {
        let cache = RequestCache::new();
        cache.set(fp(0), json!(0));
        tokio::time::advance(Duration::from_secs(10)).await;
        cache.set(fp(1), json!(1));
        tokio::time::advance(Duration::from_secs(1)).await;

        assert_eq!(cache.evict(100, Duration::from_secs(5)), 1);
        assert!(cache.get(&fp(0)).is_none());
        assert!(cache.get(&fp(1)).is_some());
    }

    #[test]
    fn remove_and_clear() {
        let cache = RequestCache::new();
        cache.set(fp(0), json!(0));
        cache.set(fp(1), json!(1));
        assert!(cache.remove(&fp(0)));
        assert!(!cache.remove(&fp(0)));
        cache.clear();
        assert!(cache.is_empty());
    }
}
