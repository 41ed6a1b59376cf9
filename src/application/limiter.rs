//! Outbound request pacing for the origin.
//!
//! Two rules apply to every scheduled task:
//!
//! 1. at most `max_concurrent` tasks run at the same time;
//! 2. consecutive dispatches start at least `min_spacing` apart.
//!
//! Waiters line up on a fair dispatch queue. Only the head of the queue waits
//! for a concurrency permit; once it has one it reserves the next free
//! dispatch slot, leaves the queue and sleeps until that slot. Dispatch order
//! is therefore arrival order even when several permits free up at once.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use metrics::{gauge, histogram};
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{self, Instant};
use tracing::{info, trace};

pub const DEFAULT_MAX_CONCURRENT: usize = 5;
pub const DEFAULT_MIN_SPACING: Duration = Duration::from_millis(200);

pub(crate) const METRIC_UPSTREAM_IN_FLIGHT: &str = "scan_proxy_upstream_in_flight";
pub(crate) const METRIC_UPSTREAM_WAIT_MS: &str = "scan_proxy_upstream_wait_ms";

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("upstream limiter is closed")]
pub struct LimiterClosed;

pub struct UpstreamLimiter {
    permits: Semaphore,
    max_concurrent: usize,
    min_spacing: Duration,
    next_dispatch: Mutex<Option<Instant>>,
    in_flight: AtomicUsize,
}

impl UpstreamLimiter {
    pub fn new(max_concurrent: usize, min_spacing: Duration) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            permits: Semaphore::new(max_concurrent),
            max_concurrent,
            min_spacing,
            next_dispatch: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    /// Tasks currently executing (past admission and pacing).
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Stop admitting work. Queued and future `schedule` calls fail with
    /// [`LimiterClosed`]; tasks already dispatched run to completion.
    pub fn close(&self) {
        if !self.permits.is_closed() {
            self.permits.close();
            info!(in_flight = self.in_flight(), "upstream limiter closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Run `task` once both the concurrency and spacing rules allow it.
    ///
    /// The task's output is returned unchanged. Dropping the returned future
    /// releases the concurrency slot.
    pub async fn schedule<F, Fut, T, E>(&self, task: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LimiterClosed>,
    {
        let queued_at = Instant::now();
        let (_permit, slot) = {
            let mut next = self.next_dispatch.lock().await;
            let permit = self.permits.acquire().await.map_err(|_| LimiterClosed)?;
            (permit, self.reserve_slot(&mut next))
        };
        time::sleep_until(slot).await;

        let waited = queued_at.elapsed();
        histogram!(METRIC_UPSTREAM_WAIT_MS).record(waited.as_secs_f64() * 1000.0);
        trace!(waited_ms = waited.as_millis() as u64, "upstream dispatch");

        let _running = InFlight::enter(&self.in_flight);
        task().await
    }

    fn reserve_slot(&self, next: &mut Option<Instant>) -> Instant {
        let now = Instant::now();
        let slot = match *next {
            Some(reserved) if reserved > now => reserved,
            _ => now,
        };
        *next = Some(slot + self.min_spacing);
        slot
    }
}

impl Default for UpstreamLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT, DEFAULT_MIN_SPACING)
    }
}

struct InFlight<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        let current = counter.fetch_add(1, Ordering::AcqRel) + 1;
        gauge!(METRIC_UPSTREAM_IN_FLIGHT).set(current as f64);
        Self { counter }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let current = self.counter.fetch_sub(1, Ordering::AcqRel) - 1;
        gauge!(METRIC_UPSTREAM_IN_FLIGHT).set(current as f64);
    }
}
