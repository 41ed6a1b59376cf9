use thiserror::Error;

/// Failures while wiring the listener, the origin client and the subscriber.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("proxy listener failed: {0}")]
    Listener(#[from] std::io::Error),
    #[error("origin http client could not be built: {message}")]
    OriginClient { message: String },
    #[error("origin is not configured: {message}")]
    OriginUnconfigured { message: String },
    #[error("tracing subscriber could not be installed: {0}")]
    Subscriber(String),
}

impl InfraError {
    pub fn origin_client(message: impl Into<String>) -> Self {
        Self::OriginClient {
            message: message.into(),
        }
    }

    pub fn origin_unconfigured(message: impl Into<String>) -> Self {
        Self::OriginUnconfigured {
            message: message.into(),
        }
    }

    pub fn subscriber(message: impl Into<String>) -> Self {
        Self::Subscriber(message.into())
    }
}
