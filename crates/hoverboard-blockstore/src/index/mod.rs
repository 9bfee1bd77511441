//! Legacy index lookup
//!
//! The legacy index maps a block multihash to the archives that contain it.
//! Rows carry a composite `region/bucket/key` path plus the byte range of the
//! block inside that object.

mod caching;

pub use caching::CachingIndexLookup;

use std::sync::Arc;

use async_trait::async_trait;
use hoverboard_formats::Link;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::BlockstoreConfig;
use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::traits::{IndexLookup, IndexQuery, IndexRow};

/// One storage location candidate for a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Region holding the archive, e.g. `us-west-2`
    pub region: String,
    /// Bucket within the region
    pub bucket: String,
    /// Object key of the archive within the bucket
    pub key: String,
    /// Offset of the block payload within the archive
    pub offset: u64,
    /// Length of the block payload in bytes
    pub length: u64,
}

impl IndexEntry {
    /// Split a row's composite path into region, bucket and key
    ///
    /// Returns `None` when the path has fewer than three segments.
    pub fn from_row(row: &IndexRow) -> Option<Self> {
        let mut parts = row.carpath.splitn(3, '/');
        let region = parts.next().filter(|s| !s.is_empty())?;
        let bucket = parts.next().filter(|s| !s.is_empty())?;
        let key = parts.next().filter(|s| !s.is_empty())?;
        Some(Self {
            region: region.to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            offset: row.offset,
            length: row.length,
        })
    }
}

/// Move entries in `preferred` ahead of all others, keeping relative order
pub fn prefer_region(entries: &mut [IndexEntry], preferred: &str) {
    entries.sort_by_key(|e| e.region != preferred);
}

/// [`IndexLookup`] backed by the remote index service
pub struct RemoteIndex {
    query: Arc<dyn IndexQuery>,
    max_entries: usize,
    preferred_region: Option<String>,
    retry_policy: RetryPolicy,
}

impl RemoteIndex {
    /// Lookup over `query`, taking row limit, preferred region and retry
    /// policy from `config`
    pub fn new(query: Arc<dyn IndexQuery>, config: &BlockstoreConfig) -> Self {
        Self {
            query,
            max_entries: config.max_index_entries,
            preferred_region: config.preferred_region.clone(),
            retry_policy: config.retry_policy.clone(),
        }
    }
}

#[async_trait]
impl IndexLookup for RemoteIndex {
    async fn get(&self, link: &Link) -> Result<Vec<IndexEntry>> {
        let digest = link.digest_base58();
        debug!(%link, %digest, "Querying index");

        let rows = self
            .retry_policy
            .execute(|| self.query.query(&digest, self.max_entries))
            .await
            .inspect_err(|e| warn!(%link, error = %e, "Index query failed"))?;

        let mut entries: Vec<IndexEntry> = rows
            .iter()
            .filter_map(|row| {
                let entry = IndexEntry::from_row(row);
                if entry.is_none() {
                    warn!(%link, carpath = %row.carpath, "Skipping malformed index row");
                }
                entry
            })
            .collect();

        if let Some(region) = &self.preferred_region {
            prefer_region(&mut entries, region);
        }
        Ok(entries)
    }
}
