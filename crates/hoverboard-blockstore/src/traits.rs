//! Seams between the resolver and its collaborators
//!
//! Every resolver and decorator implements [`Blockstore`], so they stack in
//! any order and external layers (deny lists, the exchange protocol handler)
//! only ever see `has` and `get`.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::stream::BoxStream;
use hoverboard_formats::Link;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::claims::Claim;
use crate::error::Result;
use crate::index::IndexEntry;

/// Body of an object read, delivered in chunks
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Byte range of an object read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    /// First byte to return
    pub offset: u64,
    /// Number of bytes, or `None` to read to the end of the object
    pub length: Option<u64>,
}

impl ByteRange {
    /// Open-ended range starting at `offset`
    pub const fn starting_at(offset: u64) -> Self {
        Self {
            offset,
            length: None,
        }
    }

    /// Range covering `[offset, offset + length)`
    pub const fn bounded(offset: u64, length: u64) -> Self {
        Self {
            offset,
            length: Some(length),
        }
    }

    /// Whether the range is bounded to zero bytes
    pub const fn is_empty(&self) -> bool {
        matches!(self.length, Some(0))
    }

    /// Whether a `Content-Range` value (`bytes start-end/total`) answers this range
    ///
    /// The start must match. A bounded range may come back shorter when the
    /// object ends early, never longer.
    pub fn matches_content_range(&self, value: &str) -> bool {
        let Some((span, _total)) = value
            .trim()
            .strip_prefix("bytes ")
            .and_then(|rest| rest.split_once('/'))
        else {
            return false;
        };
        let Some((start, end)) = span.split_once('-') else {
            return false;
        };
        let (Ok(start), Ok(end)) = (start.parse::<u64>(), end.parse::<u64>()) else {
            return false;
        };
        if start != self.offset || end < start {
            return false;
        }
        self.length.is_none_or(|length| end - start < length)
    }

    /// Value for an HTTP `Range` header
    ///
    /// An empty bounded range has no header form; stores answer it with an
    /// empty body without a request.
    pub fn header_value(&self) -> String {
        match self.length {
            Some(length) if length > 0 => {
                format!("bytes={}-{}", self.offset, self.offset + length - 1)
            }
            _ => format!("bytes={}-", self.offset),
        }
    }
}

/// Two-operation block contract shared by every resolver and decorator
#[async_trait]
pub trait Blockstore: Send + Sync {
    /// Whether the store believes it can produce `link`
    ///
    /// This may be approximate; a `true` answer does not promise that
    /// [`get`](Self::get) succeeds.
    async fn has(&self, link: &Link) -> Result<bool>;

    /// Bytes for `link`, or `None` if no source holds them
    async fn get(&self, link: &Link) -> Result<Option<Bytes>>;
}

/// Byte-range capable object storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stream an object, or a range of it; `None` if the key is absent
    async fn get(&self, key: &str, range: Option<ByteRange>) -> Result<Option<ByteStream>>;

    /// Store an object
    async fn put(&self, key: &str, bytes: Bytes) -> Result<()>;

    /// Read an object, or a range of it, fully into memory
    async fn get_bytes(&self, key: &str, range: Option<ByteRange>) -> Result<Option<Bytes>> {
        let Some(mut stream) = self.get(key, range).await? else {
            return Ok(None);
        };
        let mut buf = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(Some(buf.freeze()))
    }
}

/// Shared response cache
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Cached value for `key`
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store `value` under `key`, replacing any previous value
    async fn put(&self, key: &str, value: Bytes) -> Result<()>;
}

/// One row returned by the legacy index service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRow {
    /// `region/bucket/key...`
    pub carpath: String,
    /// Payload offset within the archive
    pub offset: u64,
    /// Payload length
    pub length: u64,
}

/// Legacy index service keyed by base58btc multihash
#[async_trait]
pub trait IndexQuery: Send + Sync {
    /// Up to `limit` locations recorded for `digest`
    async fn query(&self, digest: &str, limit: usize) -> Result<Vec<IndexRow>>;
}

/// Source of storage location candidates for a link
#[async_trait]
pub trait IndexLookup: Send + Sync {
    /// Candidates in the order they should be tried; empty when unknown
    async fn get(&self, link: &Link) -> Result<Vec<IndexEntry>>;
}

/// Content claims service
#[async_trait]
pub trait ClaimsClient: Send + Sync {
    /// All claims recorded for `link`
    async fn read(&self, link: &Link, service_url: Option<&Url>) -> Result<Vec<Claim>>;
}
