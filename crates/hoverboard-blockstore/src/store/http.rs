use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_RANGE, RANGE};
use tracing::debug;
use url::Url;

use crate::error::{BlockstoreError, Result};
use crate::traits::{ByteRange, ByteStream, ObjectStore};
use crate::transport::{HttpTransport, status_error};

/// Object store reached over HTTP with path-style addressing
///
/// Objects live at `{base}/{key}`. Range reads use the `Range` header and
/// bodies are streamed as they arrive.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    transport: HttpTransport,
    base: String,
}

impl HttpObjectStore {
    pub fn new(transport: HttpTransport, base: &Url) -> Self {
        Self {
            transport,
            base: base.as_str().trim_end_matches('/').to_string(),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base, key.trim_start_matches('/'))
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get(&self, key: &str, range: Option<ByteRange>) -> Result<Option<ByteStream>> {
        if range.is_some_and(|r| r.is_empty()) {
            return Ok(Some(futures::stream::empty().boxed()));
        }

        let url = self.object_url(key);
        let mut request = self.transport.inner().get(&url);
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(%url, %status, "Object read");

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(status, response.headers()));
        }
        if let Some(range) = range {
            check_partial_response(&range, &response)?;
        }

        let stream = response.bytes_stream().map_err(BlockstoreError::from);
        Ok(Some(stream.boxed()))
    }

    async fn put(&self, key: &str, bytes: Bytes) -> Result<()> {
        let response = self
            .transport
            .inner()
            .put(self.object_url(key))
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(status_error(status, response.headers()))
        }
    }
}

/// Reject replies that do not carry exactly the requested range
///
/// A server that ignores `Range` answers `200` with the whole object, which
/// must never be mistaken for the slice.
fn check_partial_response(range: &ByteRange, response: &reqwest::Response) -> Result<()> {
    let status = response.status();
    if status != StatusCode::PARTIAL_CONTENT {
        return Err(BlockstoreError::InvalidContentRange(format!(
            "expected 206 for {}, got {status}",
            range.header_value()
        )));
    }

    if let Some(value) = response.headers().get(CONTENT_RANGE) {
        let value = value
            .to_str()
            .map_err(|e| BlockstoreError::InvalidContentRange(e.to_string()))?;
        if !range.matches_content_range(value) {
            return Err(BlockstoreError::InvalidContentRange(format!(
                "{value} does not answer {}",
                range.header_value()
            )));
        }
    }

    if let (Some(expected), Some(actual)) = (range.length, response.content_length())
        && actual > expected
    {
        return Err(BlockstoreError::InvalidContentRange(format!(
            "{actual} bytes returned for a {expected} byte range"
        )));
    }
    Ok(())
}
