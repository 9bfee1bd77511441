//! Block fetching over the legacy index
//!
//! Candidates come from an [`IndexLookup`]. Each row locates the block
//! payload inside an archive object. Every candidate is first tried against
//! the fast primary store under its canonical archive key; only when none
//! succeeds there are the region-scoped stores tried under the original
//! `bucket/key`. Both tiers read the same byte range.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use hoverboard_formats::Link;
use hoverboard_formats::key::legacy_key_to_archive_key;
use tracing::{debug, warn};

use crate::error::Result;
use crate::index::IndexEntry;
use crate::metrics::{Metrics, Tier};
use crate::traits::{Blockstore, ByteRange, IndexLookup, ObjectStore};

/// Resolves blocks through an index and two tiers of object storage
pub struct MultiBackendFetcher<I> {
    index: I,
    primary: Option<Arc<dyn ObjectStore>>,
    regions: HashMap<String, Arc<dyn ObjectStore>>,
    default_region: Option<String>,
    metrics: Metrics,
}

impl<I: IndexLookup> MultiBackendFetcher<I> {
    /// Fetcher with no stores attached; add them with the `with_*` builders
    pub fn new(index: I, metrics: Metrics) -> Self {
        Self {
            index,
            primary: None,
            regions: HashMap::new(),
            default_region: None,
            metrics,
        }
    }

    /// Set the fast primary store, keyed by canonical archive keys
    #[must_use]
    pub fn with_primary(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.primary = Some(store);
        self
    }

    /// Add a fallback store for `region`, keyed by `bucket/key`
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        self.regions.insert(region.into(), store);
        self
    }

    /// Region whose store serves candidates from unknown regions
    #[must_use]
    pub fn with_default_region(mut self, region: impl Into<String>) -> Self {
        self.default_region = Some(region.into());
        self
    }

    fn region_store(&self, region: &str) -> Option<&Arc<dyn ObjectStore>> {
        self.regions.get(region).or_else(|| {
            self.default_region
                .as_ref()
                .and_then(|default| self.regions.get(default))
        })
    }

    async fn get_primary(&self, link: &Link, entries: &[IndexEntry]) -> Result<Option<Bytes>> {
        let Some(primary) = &self.primary else {
            return Ok(None);
        };

        for entry in entries {
            let key = match legacy_key_to_archive_key(&entry.key) {
                Ok(Some(key)) => key,
                Ok(None) => {
                    debug!(%link, key = %entry.key, "No canonical key for candidate");
                    continue;
                }
                Err(e) => {
                    warn!(%link, key = %entry.key, error = %e, "Undecodable legacy key");
                    continue;
                }
            };

            let range = ByteRange::bounded(entry.offset, entry.length);
            match primary.get_bytes(&key, Some(range)).await {
                Ok(Some(bytes)) => {
                    debug!(%link, %key, "Served from primary store");
                    return Ok(Some(bytes));
                }
                Ok(None) => debug!(%link, %key, "Primary store miss"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(%link, %key, error = %e, "Primary store read failed"),
            }
        }
        Ok(None)
    }

    async fn get_fallback(&self, link: &Link, entries: &[IndexEntry]) -> Result<Option<Bytes>> {
        for entry in entries {
            let Some(store) = self.region_store(&entry.region) else {
                warn!(%link, region = %entry.region, "No store for region");
                continue;
            };

            let key = format!("{}/{}", entry.bucket, entry.key);
            let range = ByteRange::bounded(entry.offset, entry.length);
            match store.get_bytes(&key, Some(range)).await {
                Ok(Some(bytes)) => {
                    debug!(%link, region = %entry.region, %key, "Served from regional store");
                    return Ok(Some(bytes));
                }
                Ok(None) => debug!(%link, region = %entry.region, %key, "Regional store miss"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(%link, region = %entry.region, %key, error = %e, "Regional store read failed");
                }
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl<I: IndexLookup> Blockstore for MultiBackendFetcher<I> {
    /// True when the index knows any location; backends are not consulted
    async fn has(&self, link: &Link) -> Result<bool> {
        Ok(!self.index.get(link).await?.is_empty())
    }

    async fn get(&self, link: &Link) -> Result<Option<Bytes>> {
        let entries = self.index.get(link).await?;
        if entries.is_empty() {
            debug!(%link, "No index entries");
            return Ok(None);
        }

        if let Some(bytes) = self.get_primary(link, &entries).await? {
            self.metrics.record(Tier::Primary, bytes.len());
            return Ok(Some(bytes));
        }

        if let Some(bytes) = self.get_fallback(link, &entries).await? {
            self.metrics.record(Tier::Fallback, bytes.len());
            return Ok(Some(bytes));
        }

        warn!(%link, candidates = entries.len(), "Every candidate location failed");
        Ok(None)
    }
}
