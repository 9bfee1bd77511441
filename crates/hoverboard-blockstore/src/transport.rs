//! Shared HTTP client construction

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, ClientBuilder, StatusCode};

use crate::config::BlockstoreConfig;
use crate::error::{BlockstoreError, Result};

/// HTTP client shared by object stores and location-claim fetches
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a client with the given per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        // reqwest is built without a bundled TLS provider; a provider may
        // already be installed by the embedding process.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(3))
            .user_agent(concat!("hoverboard/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    pub fn from_config(config: &BlockstoreConfig) -> Result<Self> {
        Self::new(config.request_timeout)
    }

    /// Get the underlying reqwest client
    pub const fn inner(&self) -> &Client {
        &self.client
    }
}

/// Map a non-success status to an error
pub(crate) fn status_error(status: StatusCode, headers: &HeaderMap) -> BlockstoreError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => BlockstoreError::RateLimited {
            retry_after: headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => BlockstoreError::Timeout,
        s if s.is_server_error() => BlockstoreError::ServerError(s),
        s => BlockstoreError::HttpStatus(s),
    }
}
