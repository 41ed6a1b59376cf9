use std::error::Error as StdError;

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;

use crate::application::access::AccessError;
use crate::application::bandwidth::BandwidthUsage;
use crate::application::error::ErrorReport;
use crate::application::origin::OriginError;
use crate::application::resolver::ResolveError;

const SOURCE: &str = "infra::http";

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const NOT_FOUND: &str = "not_found";
    pub const QUOTA_EXCEEDED: &str = "quota_exceeded";
    pub const UPSTREAM: &str = "upstream_error";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const INTERNAL: &str = "internal_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    chain: Vec<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
            chain: Vec::new(),
        }
    }

    /// Carry the full error chain into the response log.
    fn with_chain(mut self, error: &dyn StdError) -> Self {
        self.chain = ErrorReport::from_error(SOURCE, self.status, error).messages;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn invalid_input(hint: String) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid chapter or page",
            Some(hint),
        )
    }

    pub fn not_found(hint: String) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            codes::NOT_FOUND,
            "Scan page not found",
            Some(hint),
        )
    }

    pub fn quota_exceeded(usage: &BandwidthUsage) -> Self {
        let since = usage
            .last_reset_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| usage.last_reset_at.to_string());
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::QUOTA_EXCEEDED,
            "Bandwidth quota exceeded",
            Some(format!(
                "{} of {} bytes used since {since}; an operator reset is required",
                usage.used, usage.limit
            )),
        )
    }

    pub fn upstream(error: &OriginError) -> Self {
        let (status, code, message) = match error {
            OriginError::Closed(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::INTERNAL,
                "Proxy is shutting down",
            ),
            _ => (
                StatusCode::BAD_GATEWAY,
                codes::UPSTREAM,
                "Origin request failed",
            ),
        };
        Self::new(status, code, message, Some("try again later".to_string()))
    }

    pub fn unauthorized(message: &'static str, error: AccessError) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            codes::UNAUTHORIZED,
            message,
            Some(error.to_string()),
        )
    }

    pub fn rate_limited(retry_after: u64) -> Response {
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: codes::RATE_LIMITED.to_string(),
                message: "Rate limit exceeded".to_string(),
                hint: Some(format!("Retry after {retry_after} seconds")),
            },
        };
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        ErrorReport::from_message(
            "infra::http::rate_limit",
            StatusCode::TOO_MANY_REQUESTS,
            format!("rate_limited: retry_after={retry_after}"),
        )
        .attach(&mut response);
        response
    }
}

impl From<&ResolveError> for ApiError {
    fn from(err: &ResolveError) -> Self {
        match err {
            ResolveError::InvalidInput(inner) => Self::invalid_input(inner.to_string()),
            ResolveError::NotFound { scan, .. } => Self::not_found(format!("no page at {scan}")),
            ResolveError::QuotaExceeded(usage) => Self::quota_exceeded(usage),
            ResolveError::Upstream { source, .. } => Self::upstream(source).with_chain(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let messages = if self.chain.is_empty() {
            vec![format!(
                "{}: {}",
                self.code,
                self.hint.as_deref().unwrap_or(self.message)
            )]
        } else {
            self.chain
        };
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport {
            source: SOURCE,
            status: self.status,
            messages,
        }
        .attach(&mut response);
        response
    }
}
