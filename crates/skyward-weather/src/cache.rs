//! Bounded in-memory response cache with per-entry expiry.
//!
//! Each endpoint owns one `TtlCache`. Reads never see an entry once
//! `now >= stored_at + ttl`; writes evict the least recently used entry when
//! the cache is full. Entry TTLs are shortened by a small jitter bucket so
//! entries written together do not all expire together.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

/// Number of jitter buckets. Bucket `b` keeps `100 - 5*b` percent of the TTL.
pub const JITTER_BUCKETS: u8 = 5;
const JITTER_STEP_PERCENT: u32 = 5;

/// Chooses the jitter bucket for each write.
#[derive(Debug)]
pub enum TtlJitter {
    /// Always the same bucket. `Fixed(0)` disables jitter.
    Fixed(u8),
    /// Cycle through the buckets in order.
    RoundRobin(AtomicU8),
}

impl TtlJitter {
    pub fn none() -> Self {
        Self::Fixed(0)
    }

    pub fn round_robin() -> Self {
        Self::RoundRobin(AtomicU8::new(0))
    }

    /// Bucket for the next write, always below `JITTER_BUCKETS`.
    pub fn next_bucket(&self) -> u8 {
        match self {
            Self::Fixed(bucket) => bucket % JITTER_BUCKETS,
            Self::RoundRobin(counter) => counter.fetch_add(1, Ordering::Relaxed) % JITTER_BUCKETS,
        }
    }

    /// TTL after applying the given bucket.
    pub fn apply(ttl: Duration, bucket: u8) -> Duration {
        let keep = 100 - JITTER_STEP_PERCENT * u32::from(bucket % JITTER_BUCKETS);
        ttl.checked_mul(keep)
            .map_or_else(|| ttl / 100 * keep, |scaled| scaled / 100)
    }
}

impl Default for TtlJitter {
    fn default() -> Self {
        Self::round_robin()
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired_at(&self, now: Instant) -> bool {
        match self.stored_at.checked_add(self.ttl) {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }
}

/// Point-in-time counters for one cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub len: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Capacity-bounded LRU cache whose entries expire.
pub struct TtlCache<V> {
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
    default_ttl: Duration,
    jitter: TtlJitter,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize, default_ttl: Duration, jitter: TtlJitter) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            default_ttl,
            jitter,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Look up `key` as of `now`. Expired entries are dropped and reported absent.
    pub fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let mut entries = self.entries.lock();

        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store with the cache's default TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_at(key, value, self.default_ttl, Instant::now());
    }

    /// Insert or overwrite `key`, evicting the least recently used entry if full.
    pub fn set_at(&self, key: impl Into<String>, value: V, ttl: Duration, now: Instant) {
        let key = key.into();
        let ttl = TtlJitter::apply(ttl, self.jitter.next_bucket());
        let entry = CacheEntry {
            value,
            stored_at: now,
            ttl,
        };

        let mut entries = self.entries.lock();
        if let Some((evicted, _)) = entries.push(key.clone(), entry) {
            if evicted != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Evicted least recently used cache entry: {}", evicted);
            }
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        CacheStats {
            len: entries.len(),
            capacity: entries.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    fn cache(capacity: usize) -> TtlCache<String> {
        TtlCache::new(capacity, TTL, TtlJitter::none())
    }

    #[test]
    fn test_get_returns_value_before_expiry() {
        let cache = cache(4);
        let t0 = Instant::now();

        cache.set_at("london", "rain".to_string(), TTL, t0);

        assert_eq!(cache.get_at("london", t0), Some("rain".to_string()));
        assert_eq!(
            cache.get_at("london", t0 + TTL - Duration::from_millis(1)),
            Some("rain".to_string())
        );
    }

    #[test]
    fn test_get_returns_none_at_and_after_expiry() {
        let cache = cache(4);
        let t0 = Instant::now();

        cache.set_at("london", "rain".to_string(), TTL, t0);

        assert_eq!(cache.get_at("london", t0 + TTL), None);
        // Reads after expiry stay absent
        assert_eq!(cache.get_at("london", t0 + TTL), None);
        assert_eq!(cache.get_at("london", t0 + TTL * 2), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_unknown_key_is_absent() {
        let cache = cache(4);
        assert_eq!(cache.get("nowhere"), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_overwrite_replaces_value_and_refreshes_ttl() {
        let cache = cache(4);
        let t0 = Instant::now();

        cache.set_at("paris", "sun".to_string(), TTL, t0);
        cache.set_at("paris", "cloud".to_string(), TTL, t0 + Duration::from_secs(30));

        assert_eq!(
            cache.get_at("paris", t0 + Duration::from_secs(75)),
            Some("cloud".to_string())
        );
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_capacity_overflow_evicts_exactly_one_lru_key() {
        for capacity in [1usize, 2, 5, 16] {
            let cache = cache(capacity);
            let t0 = Instant::now();

            for i in 0..capacity {
                cache.set_at(format!("k{i}"), format!("v{i}"), TTL, t0);
            }
            // Touch k0 so k1 (if any) becomes least recently used
            if capacity > 1 {
                assert!(cache.get_at("k0", t0).is_some());
            }
            cache.set_at("extra", "new".to_string(), TTL, t0);

            let evicted = if capacity > 1 { "k1" } else { "k0" };
            assert_eq!(cache.get_at(evicted, t0), None, "capacity {capacity}");
            assert_eq!(cache.stats().evictions, 1, "capacity {capacity}");
            assert_eq!(cache.len(), capacity);

            for i in 0..capacity {
                let key = format!("k{i}");
                if key != evicted {
                    assert_eq!(cache.get_at(&key, t0), Some(format!("v{i}")));
                }
            }
            assert_eq!(cache.get_at("extra", t0), Some("new".to_string()));
        }
    }

    #[test]
    fn test_zero_capacity_still_holds_one_entry() {
        let cache = cache(0);
        cache.set("a", "1".to_string());
        assert_eq!(cache.stats().capacity, 1);
        assert_eq!(cache.get("a"), Some("1".to_string()));
    }

    #[test]
    fn test_purge_expired_removes_only_expired() {
        let cache = cache(8);
        let t0 = Instant::now();

        cache.set_at("short", "a".to_string(), Duration::from_secs(10), t0);
        cache.set_at("long", "b".to_string(), Duration::from_secs(100), t0);

        let removed = cache.purge_expired_at(t0 + Duration::from_secs(10));

        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get_at("long", t0 + Duration::from_secs(10)),
            Some("b".to_string())
        );
    }

    #[test]
    fn test_jitter_buckets_shorten_ttl() {
        assert_eq!(TtlJitter::apply(Duration::from_secs(100), 0), Duration::from_secs(100));
        assert_eq!(TtlJitter::apply(Duration::from_secs(100), 1), Duration::from_secs(95));
        assert_eq!(TtlJitter::apply(Duration::from_secs(100), 4), Duration::from_secs(80));
        // Out-of-range buckets wrap
        assert_eq!(TtlJitter::apply(Duration::from_secs(100), 5), Duration::from_secs(100));
    }

    #[test]
    fn test_huge_ttl_does_not_overflow() {
        let huge = Duration::from_secs(u64::MAX / 10);
        let cache: TtlCache<u32> = TtlCache::new(4, huge, TtlJitter::Fixed(1));
        let t0 = Instant::now();

        cache.set("k", 1);
        cache.set_at("max", 2, Duration::MAX, t0);

        assert_eq!(cache.get("k"), Some(1));
        assert_eq!(cache.get_at("max", t0 + Duration::from_secs(3600)), Some(2));
        assert!(TtlJitter::apply(huge, 1) < huge);
    }

    #[test]
    fn test_round_robin_cycles_through_buckets() {
        let jitter = TtlJitter::round_robin();
        let buckets: Vec<u8> = (0..7).map(|_| jitter.next_bucket()).collect();
        assert_eq!(buckets, vec![0, 1, 2, 3, 4, 0, 1]);
    }

    #[test]
    fn test_fixed_bucket_expires_entry_early() {
        let cache: TtlCache<u32> = TtlCache::new(4, TTL, TtlJitter::Fixed(4));
        let t0 = Instant::now();

        cache.set_at("k", 1, Duration::from_secs(100), t0);

        assert_eq!(cache.get_at("k", t0 + Duration::from_secs(79)), Some(1));
        assert_eq!(cache.get_at("k", t0 + Duration::from_secs(80)), None);
    }

    #[test]
    fn test_stats_track_hits_and_misses() {
        let cache = cache(4);
        cache.set("k", "v".to_string());

        let _ = cache.get("k");
        let _ = cache.get("k");
        let _ = cache.get("missing");

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.len, 1);
        assert_eq!(stats.capacity, 4);
    }
}
