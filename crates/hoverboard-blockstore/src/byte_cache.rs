//! Response-cache decorator for any [`Blockstore`]

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use hoverboard_formats::Link;
use tracing::{debug, warn};

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::metrics::{Metrics, Tier};
use crate::traits::{Blockstore, ResponseCache};

/// Caches block bytes in a [`ResponseCache`]
///
/// A hit is answered from the cache straight away. The inner store is still
/// consulted on every `get`; on a hit that happens in the background and
/// refreshes the cached entry, on a miss the caller waits for it. Cache
/// writes never delay the response.
pub struct ByteCache<B> {
    inner: Arc<B>,
    cache: Arc<dyn ResponseCache>,
    ctx: ExecutionContext,
    metrics: Metrics,
}

impl<B: Blockstore + 'static> ByteCache<B> {
    /// Wrap `inner`; cache writes run as background tasks on `ctx`
    pub fn new(
        inner: B,
        cache: Arc<dyn ResponseCache>,
        ctx: ExecutionContext,
        metrics: Metrics,
    ) -> Self {
        Self {
            inner: Arc::new(inner),
            cache,
            ctx,
            metrics,
        }
    }

    /// Cache key for `link`
    pub fn cache_key(link: &Link) -> String {
        format!("/ipfs/{link}?format=raw")
    }

    fn spawn_put(&self, key: String, bytes: Bytes) {
        let cache = Arc::clone(&self.cache);
        self.ctx.wait_until(async move {
            if let Err(e) = cache.put(&key, bytes).await {
                warn!(%key, error = %e, "Block cache write failed");
            }
        });
    }

    fn spawn_refresh(&self, link: Link, key: String) {
        let inner = Arc::clone(&self.inner);
        let cache = Arc::clone(&self.cache);
        self.ctx.wait_until(async move {
            match inner.get(&link).await {
                Ok(Some(bytes)) => {
                    if let Err(e) = cache.put(&key, bytes).await {
                        warn!(%key, error = %e, "Block cache write failed");
                    }
                }
                Ok(None) => debug!(%link, "Inner store no longer holds cached block"),
                Err(e) => warn!(%link, error = %e, "Background block refresh failed"),
            }
        });
    }
}

#[async_trait]
impl<B: Blockstore + 'static> Blockstore for ByteCache<B> {
    async fn has(&self, link: &Link) -> Result<bool> {
        let key = Self::cache_key(link);
        match self.cache.get(&key).await {
            Ok(Some(_)) => return Ok(true),
            Ok(None) => {}
            Err(e) => warn!(%key, error = %e, "Block cache read failed"),
        }
        self.inner.has(link).await
    }

    async fn get(&self, link: &Link) -> Result<Option<Bytes>> {
        let key = Self::cache_key(link);

        match self.cache.get(&key).await {
            Ok(Some(bytes)) => {
                debug!(%link, "Block cache hit");
                self.metrics.record(Tier::Cache, bytes.len());
                self.spawn_refresh(*link, key);
                return Ok(Some(bytes));
            }
            Ok(None) => debug!(%link, "Block cache miss"),
            Err(e) => warn!(%key, error = %e, "Block cache read failed"),
        }

        let bytes = self.inner.get(link).await?;
        if let Some(bytes) = &bytes {
            self.spawn_put(key, bytes.clone());
        }
        Ok(bytes)
    }
}
