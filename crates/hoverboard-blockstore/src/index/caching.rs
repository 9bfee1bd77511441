use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use hoverboard_formats::Link;
use tracing::{debug, warn};

use super::IndexEntry;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::traits::{IndexLookup, ResponseCache};

/// [`IndexLookup`] decorator that caches non-empty results
///
/// Results are stored as JSON under a key derived from the link's multihash,
/// so links with different codecs but the same digest share an entry.
/// Stores run in the background through the [`ExecutionContext`].
pub struct CachingIndexLookup<I> {
    inner: I,
    cache: Arc<dyn ResponseCache>,
    ctx: ExecutionContext,
    namespace: String,
}

impl<I: IndexLookup> CachingIndexLookup<I> {
    /// Wrap `inner`; `namespace` separates entries of different index tables
    pub fn new(
        inner: I,
        cache: Arc<dyn ResponseCache>,
        ctx: ExecutionContext,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            inner,
            cache,
            ctx,
            namespace: namespace.into(),
        }
    }

    pub fn cache_key(&self, link: &Link) -> String {
        format!("index/{}/{}", self.namespace, link.digest_base58())
    }
}

#[async_trait]
impl<I: IndexLookup> IndexLookup for CachingIndexLookup<I> {
    async fn get(&self, link: &Link) -> Result<Vec<IndexEntry>> {
        let key = self.cache_key(link);

        match self.cache.get(&key).await {
            Ok(Some(cached)) => match serde_json::from_slice::<Vec<IndexEntry>>(&cached) {
                Ok(entries) => {
                    debug!(%link, %key, "Index cache hit");
                    return Ok(entries);
                }
                Err(e) => warn!(%key, error = %e, "Discarding unreadable cached index entry"),
            },
            Ok(None) => debug!(%link, %key, "Index cache miss"),
            Err(e) => warn!(%key, error = %e, "Index cache read failed"),
        }

        let entries = self.inner.get(link).await?;
        if !entries.is_empty() {
            let body = Bytes::from(serde_json::to_vec(&entries)?);
            let cache = Arc::clone(&self.cache);
            self.ctx.wait_until(async move {
                if let Err(e) = cache.put(&key, body).await {
                    warn!(%key, error = %e, "Index cache write failed");
                }
            });
        }
        Ok(entries)
    }
}
