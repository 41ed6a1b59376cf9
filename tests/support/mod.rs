#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use bytes::Bytes;
use scan_proxy::application::access::AccessKeys;
use scan_proxy::application::bandwidth::BandwidthGate;
use scan_proxy::application::limiter::UpstreamLimiter;
use scan_proxy::application::origin::{OriginError, ScanOrigin};
use scan_proxy::application::resolver::ScanResolver;
use scan_proxy::cache::{CacheConfig, ScanCache};
use scan_proxy::config::CorsSettings;
use scan_proxy::domain::scans::{ChapterRange, ScanRef};
use scan_proxy::infra::http::{self, AppState, ClientRateLimiter};

/// In-memory origin serving a fixed set of pages.
#[derive(Default)]
pub struct StubOrigin {
    pages: Mutex<HashMap<(u32, u32), Bytes>>,
    failure: Mutex<Option<OriginError>>,
    pub fetches: AtomicUsize,
    pub probes: AtomicUsize,
}

impl StubOrigin {
    pub fn with_page(self, chapter: u32, page: u32, body: &'static [u8]) -> Self {
        self.pages
            .lock()
            .expect("pages")
            .insert((chapter, page), Bytes::from_static(body));
        self
    }

    pub fn fail_with(&self, err: Option<OriginError>) {
        *self.failure.lock().expect("failure") = err;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    fn lookup(&self, scan: &ScanRef) -> Result<Bytes, OriginError> {
        if let Some(err) = self.failure.lock().expect("failure").clone() {
            return Err(err);
        }
        self.pages
            .lock()
            .expect("pages")
            .get(&(scan.chapter(), scan.page()))
            .cloned()
            .ok_or(OriginError::NotFound)
    }
}

#[async_trait]
impl ScanOrigin for StubOrigin {
    async fn fetch(&self, scan: &ScanRef) -> Result<Bytes, OriginError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.lookup(scan)
    }

    async fn probe(&self, scan: &ScanRef) -> Result<(), OriginError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.lookup(scan).map(|_| ())
    }
}

pub struct Harness {
    pub router: Router,
    pub origin: Arc<StubOrigin>,
    pub resolver: Arc<ScanResolver>,
}

pub struct HarnessBuilder {
    origin: StubOrigin,
    quota: u64,
    api_key: Option<String>,
    admin_key: Option<String>,
    rate_limit: u32,
}

impl HarnessBuilder {
    pub fn new(origin: StubOrigin) -> Self {
        Self {
            origin,
            quota: 1024 * 1024,
            api_key: None,
            admin_key: None,
            rate_limit: 1_000,
        }
    }

    pub fn quota(mut self, bytes: u64) -> Self {
        self.quota = bytes;
        self
    }

    pub fn api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    pub fn admin_key(mut self, key: &str) -> Self {
        self.admin_key = Some(key.to_string());
        self
    }

    pub fn rate_limit(mut self, max_requests: u32) -> Self {
        self.rate_limit = max_requests;
        self
    }

    pub fn build(self) -> Harness {
        let origin = Arc::new(self.origin);
        let resolver = Arc::new(ScanResolver::new(
            Arc::new(ScanCache::new(CacheConfig::default())),
            Arc::new(BandwidthGate::new(self.quota)),
            Arc::new(UpstreamLimiter::new(5, Duration::ZERO)),
            origin.clone(),
            ChapterRange::default(),
        ));
        let state = AppState {
            resolver: Arc::clone(&resolver),
            access: Arc::new(AccessKeys::new(self.api_key, self.admin_key)),
            client_limiter: ClientRateLimiter::new(Duration::from_secs(60), self.rate_limit),
        };
        Harness {
            router: http::build_router(state, &CorsSettings::default()),
            origin,
            resolver,
        }
    }
}
