use serde::Serialize;
use time::format_description::well_known::Rfc3339;

use crate::application::bandwidth::BandwidthUsage;
use crate::cache::CacheStats;
use crate::util::bytes::ByteSize;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub cache: CacheStatsBody,
    pub bandwidth: BandwidthBody,
    pub upstream: UpstreamBody,
}

#[derive(Debug, Serialize)]
pub struct CacheStatsBody {
    pub hits: u64,
    pub misses: u64,
    pub keys: usize,
}

impl From<CacheStats> for CacheStatsBody {
    fn from(stats: CacheStats) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            keys: stats.keys,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BandwidthBody {
    pub used: u64,
    pub limit: u64,
    pub remaining: u64,
    pub percent_used: f64,
    pub remaining_percent: f64,
    pub used_human: String,
    pub limit_human: String,
    /// RFC 3339 timestamp of process start or the last operator reset.
    pub last_reset_at: String,
}

impl From<BandwidthUsage> for BandwidthBody {
    fn from(usage: BandwidthUsage) -> Self {
        Self {
            used: usage.used,
            limit: usage.limit,
            remaining: usage.remaining,
            percent_used: round2(usage.percent_used),
            remaining_percent: round2(usage.remaining_percent),
            used_human: ByteSize(usage.used).to_string(),
            limit_human: ByteSize(usage.limit).to_string(),
            last_reset_at: usage
                .last_reset_at
                .format(&Rfc3339)
                .unwrap_or_else(|_| usage.last_reset_at.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UpstreamBody {
    pub in_flight: usize,
    pub max_concurrent: usize,
    pub min_spacing_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub message: &'static str,
    pub previous: BandwidthBody,
    pub bandwidth: BandwidthBody,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
