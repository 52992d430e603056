//! Deduplication cache for flooded packets
//!
//! Keys are `hex(origin):hex(seqno)`. Size is bounded by LRU eviction. Age
//! is honoured lazily: a stale entry counts as unseen, and [`DedupCache::prune`]
//! sweeps stale entries on demand.

use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;

use weft_core::PeerId;

/// Default number of remembered packets
pub const DEFAULT_MAX_SIZE: usize = 1000;

/// Default time a packet is remembered
pub const DEFAULT_MAX_AGE: Duration = Duration::from_millis(10_000);

/// Bounds of the dedup cache
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheOptions {
    pub max_age: Duration,
    pub max_size: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        CacheOptions {
            max_age: DEFAULT_MAX_AGE,
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

pub struct DedupCache {
    seen: LruCache<String, Instant>,
    options: CacheOptions,
}

fn capacity(max_size: usize) -> NonZeroUsize {
    NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN)
}

impl DedupCache {
    pub fn new(options: CacheOptions) -> Self {
        DedupCache {
            seen: LruCache::new(capacity(options.max_size)),
            options,
        }
    }

    pub fn key(origin: &PeerId, seqno: &[u8]) -> String {
        format!("{}:{}", origin.to_hex(), hex::encode(seqno))
    }

    /// Whether `key` was seen within `max_age`. Lookup does not refresh
    /// recency.
    pub fn contains(&self, key: &str) -> bool {
        self.seen
            .peek(key)
            .is_some_and(|seen_at| seen_at.elapsed() < self.options.max_age)
    }

    /// Record `key`, returning true if it was not already (freshly) present
    pub fn check_and_insert(&mut self, key: String) -> bool {
        if self.contains(&key) {
            return false;
        }
        self.seen.put(key, Instant::now());
        true
    }

    /// Retune bounds. Shrinking evicts least recently inserted entries.
    pub fn update(&mut self, options: CacheOptions) {
        self.seen.resize(capacity(options.max_size));
        self.options = options;
    }

    /// Drop every entry older than `max_age`
    pub fn prune(&mut self) -> usize {
        let max_age = self.options.max_age;
        let stale: Vec<String> = self
            .seen
            .iter()
            .filter(|(_, seen_at)| seen_at.elapsed() >= max_age)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            self.seen.pop(key);
        }
        stale.len()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn options(&self) -> CacheOptions {
        self.options
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(CacheOptions::default())
    }
}

impl std::fmt::Debug for DedupCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupCache")
            .field("len", &self.seen.len())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u8) -> String {
        DedupCache::key(&PeerId::new([n; 32]), &[n])
    }

    #[test]
    fn test_key_format() {
        let key = DedupCache::key(&PeerId::new([0xAB; 32]), &[0x01, 0x02]);
        assert_eq!(key, format!("{}:0102", "ab".repeat(32)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_and_insert() {
        let mut cache = DedupCache::default();
        assert!(cache.check_and_insert(key(1)));
        assert!(!cache.check_and_insert(key(1)));
        assert!(cache.check_and_insert(key(2)));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_bound_evicts_oldest() {
        let mut cache = DedupCache::new(CacheOptions {
            max_size: 2,
            ..Default::default()
        });
        cache.check_and_insert(key(1));
        cache.check_and_insert(key(2));
        cache.check_and_insert(key(3));

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&key(1)));
        assert!(cache.check_and_insert(key(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_counts_as_new() {
        let mut cache = DedupCache::new(CacheOptions {
            max_age: Duration::from_millis(100),
            ..Default::default()
        });
        cache.check_and_insert(key(1));

        tokio::time::advance(Duration::from_millis(99)).await;
        assert!(!cache.check_and_insert(key(1)));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cache.check_and_insert(key(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_and_update() {
        let mut cache = DedupCache::new(CacheOptions {
            max_age: Duration::from_millis(100),
            max_size: 10,
        });
        cache.check_and_insert(key(1));
        cache.check_and_insert(key(2));
        tokio::time::advance(Duration::from_millis(150)).await;
        cache.check_and_insert(key(3));

        assert_eq!(cache.prune(), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&key(3)));

        cache.check_and_insert(key(4));
        cache.check_and_insert(key(5));
        cache.update(CacheOptions {
            max_age: Duration::from_secs(1),
            max_size: 1,
        });
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&key(5)));
        assert_eq!(cache.options().max_size, 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
