//! Scan content cache.
//!
//! Holds fetched page images ("hits") and "confirmed absent" markers
//! ("negatives"), each with its own lifetime:
//!
//! - **Hit**: image bytes, kept for `positive_ttl` (24h by default)
//! - **Negative**: origin answered 404, kept for `negative_ttl` (1h by default)
//!
//! Expiry is lazy: an expired entry is treated as absent and removed on the
//! next lookup. A periodic sweep ([`ScanCache::purge_expired`]) only reclaims
//! memory for keys nobody asks for again.

mod config;
mod keys;
mod store;

pub use config::CacheConfig;
pub use keys::CacheKey;
pub use store::{CacheEntry, CacheStats, ScanCache};

pub(crate) const METRIC_CACHE_HIT: &str = "scan_proxy_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "scan_proxy_cache_miss_total";
pub(crate) const METRIC_CACHE_STORE: &str = "scan_proxy_cache_store_total";
pub(crate) const METRIC_CACHE_EXPIRED: &str = "scan_proxy_cache_expired_total";
