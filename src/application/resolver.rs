//! Request resolution pipeline.
//!
//! `validate → cache lookup → quota check → paced origin call → cache
//! population → respond`. Existence checks and full fetches share the same
//! cache entries; they differ only in the origin call (HEAD probe vs. GET).

use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::cache::{CacheEntry, CacheKey, ScanCache};
use crate::domain::error::DomainError;
use crate::domain::scans::{ChapterRange, ScanRef};

use super::bandwidth::{BandwidthGate, BandwidthUsage};
use super::limiter::UpstreamLimiter;
use super::origin::{OriginError, ScanOrigin};

pub(crate) const METRIC_UPSTREAM_REQUEST: &str = "scan_proxy_upstream_request_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Serve the image bytes.
    Body,
    /// Answer whether the page exists; no body.
    Exists,
}

impl FetchMode {
    fn as_str(self) -> &'static str {
        match self {
            FetchMode::Body => "body",
            FetchMode::Exists => "exists",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// A successfully resolved scan page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub scan: ScanRef,
    pub cache: CacheStatus,
    /// Present only for [`FetchMode::Body`].
    pub body: Option<Bytes>,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    InvalidInput(#[from] DomainError),
    #[error("bandwidth quota exceeded")]
    QuotaExceeded(BandwidthUsage),
    #[error("scan {scan} not found")]
    NotFound { scan: ScanRef, cache: CacheStatus },
    #[error("origin failed for scan {scan}")]
    Upstream {
        scan: ScanRef,
        #[source]
        source: OriginError,
    },
}

impl ResolveError {
    /// Cache status to report, when the request got as far as the cache.
    pub fn cache_status(&self) -> Option<CacheStatus> {
        match self {
            ResolveError::InvalidInput(_) => None,
            ResolveError::NotFound { cache, .. } => Some(*cache),
            ResolveError::QuotaExceeded(_) | ResolveError::Upstream { .. } => {
                Some(CacheStatus::Miss)
            }
        }
    }
}

pub struct ScanResolver {
    cache: Arc<ScanCache>,
    bandwidth: Arc<BandwidthGate>,
    limiter: Arc<UpstreamLimiter>,
    origin: Arc<dyn ScanOrigin>,
    chapters: ChapterRange,
}

impl ScanResolver {
    pub fn new(
        cache: Arc<ScanCache>,
        bandwidth: Arc<BandwidthGate>,
        limiter: Arc<UpstreamLimiter>,
        origin: Arc<dyn ScanOrigin>,
        chapters: ChapterRange,
    ) -> Self {
        Self {
            cache,
            bandwidth,
            limiter,
            origin,
            chapters,
        }
    }

    pub fn cache(&self) -> &Arc<ScanCache> {
        &self.cache
    }

    pub fn bandwidth(&self) -> &Arc<BandwidthGate> {
        &self.bandwidth
    }

    pub fn limiter(&self) -> &Arc<UpstreamLimiter> {
        &self.limiter
    }

    /// Resolve raw `chapter`/`page` path parameters.
    #[instrument(skip(self, mode), fields(mode = mode.as_str()))]
    pub async fn resolve(
        &self,
        chapter: &str,
        page: &str,
        mode: FetchMode,
    ) -> Result<Resolution, ResolveError> {
        let scan = ScanRef::parse(chapter, page, &self.chapters)?;
        let key = CacheKey::from(&scan);

        match self.cache.get(&key) {
            Some(CacheEntry::Hit(bytes)) => {
                debug!(key = %key, "cache hit");
                return Ok(self.respond(scan, CacheStatus::Hit, mode, bytes));
            }
            Some(CacheEntry::Negative) => {
                debug!(key = %key, "negative cache hit");
                return Err(ResolveError::NotFound {
                    scan,
                    cache: CacheStatus::Hit,
                });
            }
            None => debug!(key = %key, "cache miss"),
        }

        if !self.bandwidth.check_admit() {
            return Err(ResolveError::QuotaExceeded(self.bandwidth.current_usage()));
        }

        match mode {
            FetchMode::Body => {
                let bytes = self.fetch(scan, key).await?;
                Ok(self.respond(scan, CacheStatus::Miss, mode, bytes))
            }
            FetchMode::Exists => {
                self.probe(scan, key).await?;
                Ok(Resolution {
                    scan,
                    cache: CacheStatus::Miss,
                    body: None,
                })
            }
        }
    }

    async fn fetch(&self, scan: ScanRef, key: CacheKey) -> Result<Bytes, ResolveError> {
        let origin = Arc::clone(&self.origin);
        let outcome = self
            .limiter
            .schedule(|| async move { origin.fetch(&scan).await })
            .await;

        match outcome {
            Ok(bytes) => {
                record_upstream("fetch", "ok");
                self.cache.put_hit(key, bytes.clone());
                Ok(bytes)
            }
            Err(err) => Err(self.origin_failure(scan, key, "fetch", err)),
        }
    }

    async fn probe(&self, scan: ScanRef, key: CacheKey) -> Result<(), ResolveError> {
        let origin = Arc::clone(&self.origin);
        let outcome = self
            .limiter
            .schedule(|| async move { origin.probe(&scan).await })
            .await;

        match outcome {
            Ok(()) => {
                record_upstream("probe", "ok");
                Ok(())
            }
            Err(err) => Err(self.origin_failure(scan, key, "probe", err)),
        }
    }

    fn origin_failure(
        &self,
        scan: ScanRef,
        key: CacheKey,
        call: &'static str,
        err: OriginError,
    ) -> ResolveError {
        record_upstream(call, err.label());
        if err.is_not_found() {
            self.cache.put_negative(key);
            return ResolveError::NotFound {
                scan,
                cache: CacheStatus::Miss,
            };
        }

        warn!(scan = %scan, call, error = %err, "origin request failed");
        ResolveError::Upstream { scan, source: err }
    }

    /// Final step: measure the outgoing payload and shape the result.
    fn respond(
        &self,
        scan: ScanRef,
        cache: CacheStatus,
        mode: FetchMode,
        bytes: Bytes,
    ) -> Resolution {
        let body = match mode {
            FetchMode::Body => {
                self.bandwidth.record_bytes(bytes.len() as u64);
                Some(bytes)
            }
            FetchMode::Exists => None,
        };
        Resolution { scan, cache, body }
    }
}

fn record_upstream(call: &'static str, outcome: &'static str) {
    counter!(METRIC_UPSTREAM_REQUEST, "call" => call, "outcome" => outcome).increment(1);
}
