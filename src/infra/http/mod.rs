//! HTTP surface: routing, pre-stage middleware and response shaping.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod rate_limit;

pub use rate_limit::ClientRateLimiter;

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::application::access::AccessKeys;
use crate::application::resolver::ScanResolver;
use crate::config::CorsSettings;

use self::middleware::{
    API_KEY_HEADER, client_rate_limit, log_responses, require_api_key, set_request_context,
};

#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<ScanResolver>,
    pub access: Arc<AccessKeys>,
    pub client_limiter: ClientRateLimiter,
}

pub fn build_router(state: AppState, cors: &CorsSettings) -> Router {
    let client_routes = Router::new()
        .route(
            "/api/proxy/{chapter}/{page}",
            get(handlers::get_scan).head(handlers::head_scan),
        )
        .route("/api/stats", get(handlers::stats))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let api_routes = Router::new()
        .route(
            "/api/admin/reset-bandwidth",
            post(handlers::reset_bandwidth),
        )
        .merge(client_routes)
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            client_rate_limit,
        ));

    let router = Router::new()
        .route("/", get(handlers::liveness))
        .merge(api_routes)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
        .with_state(state);

    match cors_layer(cors) {
        Some(layer) => router.layer(layer),
        None => router,
    }
}

fn cors_layer(cors: &CorsSettings) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = cors
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(origin = %origin, error = %err, "skipping unusable CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::HEAD, Method::POST])
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                HeaderName::from_static(API_KEY_HEADER),
                HeaderName::from_static(handlers::ADMIN_KEY_HEADER),
            ])
            .expose_headers([
                HeaderName::from_static(handlers::CACHE_STATUS_HEADER),
                HeaderName::from_static(handlers::BANDWIDTH_USED_HEADER),
                HeaderName::from_static(handlers::BANDWIDTH_LIMIT_HEADER),
            ]),
    )
}
