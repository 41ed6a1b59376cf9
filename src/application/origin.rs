//! Port to the upstream image host.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::domain::scans::ScanRef;

use super::limiter::LimiterClosed;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OriginError {
    #[error("origin has no such page")]
    NotFound,
    #[error("origin answered with unexpected status {0}")]
    Status(u16),
    #[error("origin request timed out")]
    Timeout,
    #[error("origin transport failure: {0}")]
    Transport(String),
    #[error(transparent)]
    Closed(#[from] LimiterClosed),
}

impl OriginError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, OriginError::NotFound)
    }

    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            OriginError::NotFound => "not_found",
            OriginError::Status(_) => "status",
            OriginError::Timeout => "timeout",
            OriginError::Transport(_) => "transport",
            OriginError::Closed(_) => "closed",
        }
    }
}

/// Fetches scan pages from the origin.
///
/// Implementations map an origin 404 to [`OriginError::NotFound`]; every other
/// failure is transient from the caller's point of view.
#[async_trait]
pub trait ScanOrigin: Send + Sync {
    /// Download the page image.
    async fn fetch(&self, scan: &ScanRef) -> Result<Bytes, OriginError>;

    /// Check that the page exists without transferring its body.
    async fn probe(&self, scan: &ScanRef) -> Result<(), OriginError>;
}
