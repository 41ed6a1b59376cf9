use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::application::bandwidth::BandwidthUsage;
use crate::application::resolver::{CacheStatus, FetchMode, Resolution, ResolveError};

use super::AppState;
use super::error::ApiError;
use super::models::{CacheStatsBody, ResetResponse, StatsResponse, UpstreamBody};

pub const CACHE_STATUS_HEADER: &str = "x-cache";
pub const BANDWIDTH_USED_HEADER: &str = "x-bandwidth-used";
pub const BANDWIDTH_LIMIT_HEADER: &str = "x-bandwidth-limit";
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

const IMAGE_CONTENT_TYPE: &str = "image/png";
const IMAGE_CACHE_CONTROL: &str = "public, max-age=86400";

pub async fn liveness() -> &'static str {
    "scan-proxy is running"
}

pub async fn get_scan(
    State(state): State<AppState>,
    Path((chapter, page)): Path<(String, String)>,
) -> Response {
    let outcome = state
        .resolver
        .resolve(&chapter, &page, FetchMode::Body)
        .await;
    scan_response(&state, outcome)
}

pub async fn head_scan(
    State(state): State<AppState>,
    Path((chapter, page)): Path<(String, String)>,
) -> Response {
    let outcome = state
        .resolver
        .resolve(&chapter, &page, FetchMode::Exists)
        .await;
    let response = scan_response(&state, outcome);

    let (parts, _) = response.into_parts();
    Response::from_parts(parts, Body::empty())
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let resolver = &state.resolver;
    let limiter = resolver.limiter();

    Json(StatsResponse {
        cache: CacheStatsBody::from(resolver.cache().stats()),
        bandwidth: resolver.bandwidth().current_usage().into(),
        upstream: UpstreamBody {
            in_flight: limiter.in_flight(),
            max_concurrent: limiter.max_concurrent(),
            min_spacing_ms: u64::try_from(limiter.min_spacing().as_millis()).unwrap_or(u64::MAX),
        },
    })
}

pub async fn reset_bandwidth(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let presented = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim);

    if let Err(err) = state.access.authorize_admin(presented) {
        return ApiError::unauthorized("Admin key required", err).into_response();
    }

    let gate = state.resolver.bandwidth();
    let previous = gate.reset();
    Json(ResetResponse {
        message: "bandwidth counter reset",
        previous: previous.into(),
        bandwidth: gate.current_usage().into(),
    })
    .into_response()
}

fn scan_response(state: &AppState, outcome: Result<Resolution, ResolveError>) -> Response {
    let (mut response, cache) = match outcome {
        Ok(resolution) => {
            let mut response = match resolution.body {
                Some(bytes) => (StatusCode::OK, bytes).into_response(),
                None => StatusCode::OK.into_response(),
            };
            let headers = response.headers_mut();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(IMAGE_CONTENT_TYPE),
            );
            headers.insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static(IMAGE_CACHE_CONTROL),
            );
            (response, Some(resolution.cache))
        }
        Err(err) => {
            let cache = err.cache_status();
            (ApiError::from(&err).into_response(), cache)
        }
    };

    annotate(
        response.headers_mut(),
        cache,
        &state.resolver.bandwidth().current_usage(),
    );
    response
}

fn annotate(headers: &mut HeaderMap, cache: Option<CacheStatus>, usage: &BandwidthUsage) {
    if let Some(cache) = cache {
        headers.insert(
            CACHE_STATUS_HEADER,
            HeaderValue::from_static(cache.as_str()),
        );
    }
    headers.insert(BANDWIDTH_USED_HEADER, HeaderValue::from(usage.used));
    headers.insert(BANDWIDTH_LIMIT_HEADER, HeaderValue::from(usage.limit));
}
