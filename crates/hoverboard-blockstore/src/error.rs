//! Error types for block resolution

use std::time::Duration;

use hoverboard_formats::FormatError;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised while resolving blocks
#[derive(Debug, Error)]
pub enum BlockstoreError {
    /// No source holds the block or object
    #[error("Block not found: {0}")]
    NotFound(String),

    /// Malformed archive, index or identifier bytes; never retried
    #[error("Decode error: {0}")]
    Decode(#[from] FormatError),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Transient failure reported by a collaborator
    #[error("Backend error: {0}")]
    Backend(String),

    /// 5xx reply
    #[error("Server error: {0}")]
    ServerError(StatusCode),

    /// Any other non-success reply
    #[error("Unexpected HTTP status: {0}")]
    HttpStatus(StatusCode),

    /// A range read was answered with something other than the range
    #[error("Invalid range response: {0}")]
    InvalidContentRange(String),

    /// Request or gateway timeout
    #[error("Timeout")]
    Timeout,

    /// Backend rate limit
    #[error("Rate limited")]
    RateLimited {
        /// Duration from the HTTP Retry-After header, if present
        retry_after: Option<Duration>,
    },

    /// Backend quota, such as a subrequest limit
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Response cache failure
    #[error("Cache error: {0}")]
    Cache(String),

    /// Cached value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Rejected configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Counter registration or exposition failure
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl BlockstoreError {
    /// Create a not found error for a link or key
    pub fn not_found(what: impl ToString) -> Self {
        Self::NotFound(what.to_string())
    }

    /// Create a generic backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Check if error is retryable
    ///
    /// Rate limits are retryable here even though they also count as
    /// resource exhaustion; quota errors are not.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Backend(_) | Self::ServerError(_) | Self::Timeout | Self::RateLimited { .. } => {
                true
            }
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::HttpStatus(status) => {
                matches!(
                    *status,
                    StatusCode::TOO_MANY_REQUESTS
                        | StatusCode::BAD_GATEWAY
                        | StatusCode::SERVICE_UNAVAILABLE
                        | StatusCode::GATEWAY_TIMEOUT
                )
            }
            _ => false,
        }
    }

    /// Backend signalled a quota or rate limit
    pub const fn is_resource_exhausted(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::ResourceExhausted(_))
    }

    /// Errors that fetchers propagate instead of moving to the next candidate
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Decode(_)) || self.is_resource_exhausted()
    }

    /// Get the Retry-After hint duration, if this is a rate-limited error with one.
    pub const fn retry_after_hint(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BlockstoreError>;
