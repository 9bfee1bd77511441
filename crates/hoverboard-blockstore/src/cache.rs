//! In-memory response cache

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use crate::error::Result;
use crate::traits::ResponseCache;

/// `DashMap`-backed [`ResponseCache`] with no eviction
#[derive(Debug, Clone, Default)]
pub struct MemoryResponseCache {
    entries: Arc<DashMap<String, Bytes>>,
}

impl MemoryResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

#[async_trait]
impl ResponseCache for MemoryResponseCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = MemoryResponseCache::new();
        assert!(cache.get("k").await.unwrap().is_none());

        cache.put("k", Bytes::from_static(b"one")).await.unwrap();
        cache.put("k", Bytes::from_static(b"two")).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap().unwrap().as_ref(), b"two");
        assert_eq!(cache.len(), 1);
    }
}
