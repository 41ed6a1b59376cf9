//! Cache configuration.
//!
//! Controls entry lifetimes and the background sweep cadence.

use std::time::Duration;

const DEFAULT_POSITIVE_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_NEGATIVE_TTL_SECS: u64 = 60 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10 * 60;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Lifetime of a cached image.
    pub positive_ttl: Duration,
    /// Lifetime of a "confirmed absent" marker.
    pub negative_ttl: Duration,
    /// How often expired entries are swept out of memory.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            positive_ttl: Duration::from_secs(DEFAULT_POSITIVE_TTL_SECS),
            negative_ttl: Duration::from_secs(DEFAULT_NEGATIVE_TTL_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            positive_ttl: settings.positive_ttl,
            negative_ttl: settings.negative_ttl,
            sweep_interval: settings.sweep_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.positive_ttl, Duration::from_secs(86_400));
        assert_eq!(config.negative_ttl, Duration::from_secs(3_600));
        assert_eq!(config.sweep_interval, Duration::from_secs(600));
    }
}
