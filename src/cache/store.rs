//! Cache storage.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use metrics::counter;
use tokio::time::Instant;
use tracing::debug;

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::{METRIC_CACHE_EXPIRED, METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_CACHE_STORE};

/// A cached resolution for one scan page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEntry {
    /// Image bytes served by the origin.
    Hit(Bytes),
    /// The origin confirmed the page does not exist.
    Negative,
}

impl CacheEntry {
    fn kind(&self) -> &'static str {
        match self {
            CacheEntry::Hit(_) => "positive",
            CacheEntry::Negative => "negative",
        }
    }
}

/// Counters since process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub keys: usize,
}

struct StoredEntry {
    entry: CacheEntry,
    expires_at: Instant,
}

impl StoredEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-memory scan cache with per-entry expiry.
///
/// Writes for the same key replace the previous entry; concurrent writers
/// race with last-writer-wins.
pub struct ScanCache {
    config: CacheConfig,
    entries: DashMap<CacheKey, StoredEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ScanCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a live entry. Expired entries count as a miss and are dropped.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let now = Instant::now();
        let (found, expired) = match self.entries.get(key) {
            Some(stored) if stored.is_live(now) => (Some(stored.entry.clone()), false),
            Some(_) => (None, true),
            None => (None, false),
        };

        if expired {
            // Only drop the entry if nobody refreshed it in the meantime.
            if self
                .entries
                .remove_if(key, |_, stored| !stored.is_live(now))
                .is_some()
            {
                counter!(METRIC_CACHE_EXPIRED).increment(1);
                debug!(key = %key, "dropped expired cache entry");
            }
        }

        match found {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                counter!(METRIC_CACHE_HIT, "kind" => entry.kind()).increment(1);
                Some(entry)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                counter!(METRIC_CACHE_MISS).increment(1);
                None
            }
        }
    }

    pub fn put_hit(&self, key: CacheKey, bytes: Bytes) {
        self.put_hit_with_ttl(key, bytes, self.config.positive_ttl);
    }

    pub fn put_hit_with_ttl(&self, key: CacheKey, bytes: Bytes, ttl: Duration) {
        self.insert(key, CacheEntry::Hit(bytes), ttl);
    }

    pub fn put_negative(&self, key: CacheKey) {
        self.put_negative_with_ttl(key, self.config.negative_ttl);
    }

    pub fn put_negative_with_ttl(&self, key: CacheKey, ttl: Duration) {
        self.insert(key, CacheEntry::Negative, ttl);
    }

    fn insert(&self, key: CacheKey, entry: CacheEntry, ttl: Duration) {
        counter!(METRIC_CACHE_STORE, "kind" => entry.kind()).increment(1);
        debug!(key = %key, kind = entry.kind(), ttl_secs = ttl.as_secs(), "cache store");
        let now = Instant::now();
        let expires_at = now.checked_add(ttl).unwrap_or_else(|| far_future(now));
        self.entries.insert(key, StoredEntry { entry, expires_at });
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, stored| stored.is_live(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            counter!(METRIC_CACHE_EXPIRED).increment(removed as u64);
        }
        removed
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|stored| stored.value().is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            keys: self.len(),
        }
    }
}

/// Expiry used when a TTL does not fit the clock.
fn far_future(now: Instant) -> Instant {
    // roughly thirty years
    now.checked_add(Duration::from_secs(86_400 * 365 * 30))
        .unwrap_or(now)
}
