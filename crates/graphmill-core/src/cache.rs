//! Generic evicting cache for expensive pipeline results.
//!
//! A key→value store with TTL expiry and size-bounded batch LRU eviction,
//! used to memoize extraction-oracle and embedder calls keyed by content
//! hash. Expiry is checked lazily on `get`; callers that want proactive
//! cleanup run [`EvictingCache::sweep`] on their own schedule (the
//! application crate drives it from a tokio interval task), so no timer is
//! hidden inside the cache and tests never wait on wall time — a [`Clock`]
//! is injected instead.
//!
//! When the live entry count exceeds `max_entries`, the entries with the
//! lowest `(hit_count, inserted_at)` rank are evicted in one 30% batch,
//! amortizing eviction cost instead of evicting one entry per insert.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

/// Time source abstraction so TTL behavior is testable without real waits.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Size and age bounds for an [`EvictingCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_age: Duration,
}

impl CacheConfig {
    /// Short-TTL cache for extraction-oracle results.
    pub fn extraction() -> Self {
        Self {
            max_entries: 512,
            max_age: Duration::hours(1),
        }
    }

    /// Longer-lived, larger cache for embedding vectors.
    pub fn embedding() -> Self {
        Self {
            max_entries: 4096,
            max_age: Duration::hours(24),
        }
    }
}

struct CacheEntry<T> {
    value: T,
    inserted_at: DateTime<Utc>,
    hit_count: u64,
    approx_size_bytes: usize,
}

/// Stable cache key for a piece of text: whitespace-normalized SHA-256, so
/// semantically identical inputs map to the same key regardless of
/// incidental formatting.
pub fn content_key(data: &str) -> String {
    let normalized: String = data.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Snapshot of cache health counters.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheMetrics {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub total_size_bytes: usize,
}

/// Thread-safe TTL + LRU-batch evicting cache.
pub struct EvictingCache<T> {
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    size_of: fn(&T) -> usize,
}

impl<T: Clone> EvictingCache<T> {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            size_of: |_| std::mem::size_of::<T>(),
        }
    }

    /// Replace the per-value size estimator used for `total_size_bytes`.
    pub fn with_size_estimator(mut self, size_of: fn(&T) -> usize) -> Self {
        self.size_of = size_of;
        self
    }

    /// Stable cache key for a piece of text. See [`content_key`].
    pub fn generate_key(data: &str) -> String {
        content_key(data)
    }

    /// Look up a key, treating expired entries as absent (and removing them).
    pub fn get(&self, key: &str) -> Option<T> {
        let now = self.clock.now();
        let mut entries = self.entries.write().unwrap();

        let expired = match entries.get(key) {
            Some(entry) => now.signed_duration_since(entry.inserted_at) > self.config.max_age,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if expired {
            entries.remove(key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let entry = entries.get_mut(key)?;
        entry.hit_count += 1;
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.value.clone())
    }

    /// Insert or replace a value. May trigger a batch eviction.
    pub fn set(&self, key: impl Into<String>, value: T) {
        let approx_size_bytes = (self.size_of)(&value);
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            key.into(),
            CacheEntry {
                value,
                inserted_at: self.clock.now(),
                hit_count: 0,
                approx_size_bytes,
            },
        );

        if entries.len() > self.config.max_entries {
            Self::evict_batch(&mut entries);
        }
    }

    /// Evict the lowest-ranked 30% of entries by `(hit_count, inserted_at)`.
    fn evict_batch(entries: &mut HashMap<String, CacheEntry<T>>) {
        let mut ranked: Vec<(String, u64, DateTime<Utc>)> = entries
            .iter()
            .map(|(k, e)| (k.clone(), e.hit_count, e.inserted_at))
            .collect();
        ranked.sort_by(|a, b| (a.1, a.2).cmp(&(b.1, b.2)));

        let evict_count = (ranked.len() * 3 / 10).max(1);
        for (key, _, _) in ranked.into_iter().take(evict_count) {
            entries.remove(&key);
        }
    }

    /// True when the key is present and unexpired. Does not count as a hit.
    pub fn has(&self, key: &str) -> bool {
        let now = self.clock.now();
        let entries = self.entries.read().unwrap();
        entries
            .get(key)
            .map(|e| now.signed_duration_since(e.inserted_at) <= self.config.max_age)
            .unwrap_or(false)
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut entries = self.entries.write().unwrap();
        entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap();
        entries.clear();
    }

    /// Remove all expired entries; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();
        entries.retain(|_, e| now.signed_duration_since(e.inserted_at) <= self.config.max_age);
        before - entries.len()
    }

    pub fn metrics(&self) -> CacheMetrics {
        let entries = self.entries.read().unwrap();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheMetrics {
            entries: entries.len(),
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            total_size_bytes: entries.values().map(|e| e.approx_size_bytes).sum(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualClock;

    fn small_cache(max_entries: usize, clock: Arc<ManualClock>) -> EvictingCache<String> {
        EvictingCache::with_clock(
            CacheConfig {
                max_entries,
                max_age: Duration::seconds(60),
            },
            clock,
        )
        .with_size_estimator(|v| v.len())
    }

    #[test]
    fn test_get_set_roundtrip() {
        let cache = small_cache(10, Arc::new(ManualClock::new()));
        assert_eq!(cache.get("k"), None);
        cache.set("k", "v".to_string());
        assert_eq!(cache.get("k"), Some("v".to_string()));
        assert!(cache.has("k"));
        assert!(cache.delete("k"));
        assert!(!cache.has("k"));
    }

    #[test]
    fn test_eviction_removes_lowest_ranked() {
        let clock = Arc::new(ManualClock::new());
        let cache = small_cache(10, clock.clone());

        for i in 0..10 {
            cache.set(format!("k{}", i), "v".to_string());
            clock.advance(Duration::milliseconds(10));
        }
        assert_eq!(cache.len(), 10);

        // The 11th insert triggers a 30% batch eviction of the oldest
        // zero-hit entries.
        cache.set("k10", "v".to_string());
        assert!(cache.len() <= 10);
        assert_eq!(cache.len(), 8);
        for evicted in ["k0", "k1", "k2"] {
            assert!(!cache.has(evicted), "{} should be evicted", evicted);
        }
        assert!(cache.has("k3"));
        assert!(cache.has("k10"));
    }

    #[test]
    fn test_hit_count_protects_from_eviction() {
        let clock = Arc::new(ManualClock::new());
        let cache = small_cache(10, clock.clone());

        cache.set("hot", "v".to_string());
        clock.advance(Duration::milliseconds(10));
        for _ in 0..5 {
            cache.get("hot");
        }
        for i in 0..10 {
            cache.set(format!("k{}", i), "v".to_string());
            clock.advance(Duration::milliseconds(10));
        }

        // "hot" is the oldest entry but outranks the zero-hit ones.
        assert!(cache.has("hot"));
    }

    #[test]
    fn test_ttl_expiry_on_get() {
        let clock = Arc::new(ManualClock::new());
        let cache = small_cache(10, clock.clone());

        cache.set("k", "v".to_string());
        clock.advance(Duration::seconds(61));
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_sweep_removes_expired() {
        let clock = Arc::new(ManualClock::new());
        let cache = small_cache(10, clock.clone());

        cache.set("old", "v".to_string());
        clock.advance(Duration::seconds(61));
        cache.set("new", "v".to_string());

        assert_eq!(cache.sweep(), 1);
        assert!(!cache.has("old"));
        assert!(cache.has("new"));
    }

    #[test]
    fn test_metrics() {
        let cache = small_cache(10, Arc::new(ManualClock::new()));
        cache.set("a", "four".to_string());
        cache.get("a");
        cache.get("a");
        cache.get("missing");

        let m = cache.metrics();
        assert_eq!(m.entries, 1);
        assert_eq!(m.hits, 2);
        assert_eq!(m.misses, 1);
        assert!((m.hit_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(m.total_size_bytes, 4);
    }

    #[test]
    fn test_generate_key_normalizes_whitespace() {
        let a = EvictingCache::<String>::generate_key("  hello   world \n");
        let b = EvictingCache::<String>::generate_key("hello world");
        let c = EvictingCache::<String>::generate_key("hello worlds");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_clear() {
        let cache = small_cache(10, Arc::new(ManualClock::new()));
        cache.set("a", "v".to_string());
        cache.set("b", "v".to_string());
        cache.clear();
        assert!(cache.is_empty());
    }
}
