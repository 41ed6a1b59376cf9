//! Egress bandwidth quota.
//!
//! Every served image body is counted. Once the counter reaches the quota,
//! requests that would need the origin are refused until an operator resets
//! the counter. Cache hits keep being served.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use metrics::counter;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::util::bytes::ByteSize;

pub const DEFAULT_LIMIT_BYTES: u64 = 10 * 1024 * 1024 * 1024;

pub(crate) const METRIC_BANDWIDTH_BYTES: &str = "scan_proxy_bandwidth_bytes_total";
pub(crate) const METRIC_QUOTA_REJECTED: &str = "scan_proxy_quota_rejected_total";

/// Point-in-time view of the quota.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandwidthUsage {
    pub used: u64,
    pub limit: u64,
    pub remaining: u64,
    pub percent_used: f64,
    pub remaining_percent: f64,
    /// Process start, or the most recent operator reset.
    pub last_reset_at: OffsetDateTime,
}

impl BandwidthUsage {
    pub fn is_exhausted(&self) -> bool {
        self.used >= self.limit
    }
}

pub struct BandwidthGate {
    used: AtomicU64,
    limit: u64,
    last_reset_unix: AtomicI64,
}

impl BandwidthGate {
    pub fn new(limit: u64) -> Self {
        Self {
            used: AtomicU64::new(0),
            limit,
            last_reset_unix: AtomicI64::new(OffsetDateTime::now_utc().unix_timestamp()),
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Whether a new origin fetch may start.
    pub fn check_admit(&self) -> bool {
        let admitted = self.used.load(Ordering::Acquire) < self.limit;
        if !admitted {
            counter!(METRIC_QUOTA_REJECTED).increment(1);
        }
        admitted
    }

    pub fn record_bytes(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }
        let previous = self.used.fetch_add(bytes, Ordering::AcqRel);
        counter!(METRIC_BANDWIDTH_BYTES).increment(bytes);

        let now_used = previous.saturating_add(bytes);
        if previous < self.limit && now_used >= self.limit {
            warn!(
                used = %ByteSize(now_used),
                limit = %ByteSize(self.limit),
                "bandwidth quota exhausted; origin fetches disabled until reset"
            );
        }
    }

    /// Zero the counter, returning the usage observed just before the reset.
    pub fn reset(&self) -> BandwidthUsage {
        let before = self.current_usage();
        self.used.store(0, Ordering::Release);
        self.last_reset_unix
            .store(OffsetDateTime::now_utc().unix_timestamp(), Ordering::Release);
        info!(
            previous_used = %ByteSize(before.used),
            limit = %ByteSize(self.limit),
            "bandwidth counter reset"
        );
        before
    }

    pub fn current_usage(&self) -> BandwidthUsage {
        let used = self.used.load(Ordering::Acquire);
        let remaining = self.limit.saturating_sub(used);
        let percent_used = if self.limit == 0 {
            100.0
        } else {
            (used as f64 / self.limit as f64 * 100.0).min(100.0)
        };
        let last_reset_at =
            OffsetDateTime::from_unix_timestamp(self.last_reset_unix.load(Ordering::Acquire))
                .unwrap_or(OffsetDateTime::UNIX_EPOCH);

        BandwidthUsage {
            used,
            limit: self.limit,
            remaining,
            percent_used,
            remaining_percent: 100.0 - percent_used,
            last_reset_at,
        }
    }
}

impl Default for BandwidthGate {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn admits_until_quota_reached() {
        let gate = BandwidthGate::new(1_000);
        assert!(gate.check_admit());

        gate.record_bytes(999);
        assert!(gate.check_admit());

        gate.record_bytes(1);
        assert!(!gate.check_admit());
        assert!(!gate.check_admit());

        gate.record_bytes(500);
        assert!(!gate.check_admit());
        assert_eq!(gate.current_usage().used, 1_500);
    }

    #[test]
    fn reset_reopens_the_gate() {
        let gate = BandwidthGate::new(100);
        gate.record_bytes(250);
        assert!(!gate.check_admit());

        let before = gate.reset();
        assert_eq!(before.used, 250);
        assert!(before.is_exhausted());

        assert!(gate.check_admit());
        assert_eq!(gate.current_usage().used, 0);
    }

    #[test]
    fn usage_snapshot_reports_percentages() {
        let gate = BandwidthGate::new(400);
        gate.record_bytes(100);

        let usage = gate.current_usage();
        assert_eq!(usage.used, 100);
        assert_eq!(usage.limit, 400);
        assert_eq!(usage.remaining, 300);
        assert!((usage.percent_used - 25.0).abs() < f64::EPSILON);
        assert!((usage.remaining_percent - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn overshoot_is_clamped_in_percentages() {
        let gate = BandwidthGate::new(10);
        gate.record_bytes(40);

        let usage = gate.current_usage();
        assert_eq!(usage.remaining, 0);
        assert!((usage.percent_used - 100.0).abs() < f64::EPSILON);
        assert!(usage.remaining_percent.abs() < f64::EPSILON);
    }

    #[test]
    fn zero_limit_never_admits() {
        let gate = BandwidthGate::new(0);
        assert!(!gate.check_admit());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_recording_is_lossless() {
        let gate = Arc::new(BandwidthGate::new(u64::MAX));
        let mut handles = Vec::new();
        for _ in 0..32 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move {
                for _ in 0..1_000 {
                    gate.record_bytes(3);
                }
            }));
        }
        for handle in handles {
            handle.await.expect("recorder task");
        }
        assert_eq!(gate.current_usage().used, 32 * 1_000 * 3);
    }
}
