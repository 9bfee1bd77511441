use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::StreamExt;

use crate::error::Result;
use crate::traits::{ByteRange, ByteStream, ObjectStore};

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// In-memory object store
///
/// Bodies are streamed in fixed-size chunks. The store counts bytes actually
/// pulled from those streams, so readers that stop early can be observed.
#[derive(Debug, Clone)]
pub struct MemoryObjectStore {
    objects: Arc<DashMap<String, Bytes>>,
    gets: Arc<DashMap<String, u64>>,
    bytes_pulled: Arc<AtomicU64>,
    chunk_size: usize,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectStore {
    /// Empty store streaming bodies in default-sized chunks
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    /// Store that delivers bodies in chunks of `chunk_size` bytes
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            objects: Arc::new(DashMap::new()),
            gets: Arc::new(DashMap::new()),
            bytes_pulled: Arc::new(AtomicU64::new(0)),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Insert an object synchronously
    pub fn insert(&self, key: impl Into<String>, bytes: impl Into<Bytes>) {
        self.objects.insert(key.into(), bytes.into());
    }

    /// Total bytes pulled from streams returned by `get`
    pub fn bytes_pulled(&self) -> u64 {
        self.bytes_pulled.load(Ordering::SeqCst)
    }

    /// Number of `get` calls issued for `key`
    pub fn get_count(&self, key: &str) -> u64 {
        self.gets.get(key).map_or(0, |c| *c)
    }

    /// Whether an object is stored under `key`
    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str, range: Option<ByteRange>) -> Result<Option<ByteStream>> {
        *self.gets.entry(key.to_string()).or_insert(0) += 1;

        let Some(data) = self.objects.get(key).map(|v| v.clone()) else {
            return Ok(None);
        };

        let len = data.len() as u64;
        let (start, end) = match range {
            None => (0, len),
            Some(ByteRange { offset, length }) => {
                let start = offset.min(len);
                let end = length.map_or(len, |l| start.saturating_add(l).min(len));
                (start, end)
            }
        };
        #[allow(clippy::cast_possible_truncation)]
        let body = data.slice(start as usize..end as usize);

        let chunk_size = self.chunk_size;
        let pulled = Arc::clone(&self.bytes_pulled);
        let stream = futures::stream::unfold(body, move |mut rest| {
            let pulled = Arc::clone(&pulled);
            async move {
                if rest.is_empty() {
                    return None;
                }
                let chunk = rest.split_to(chunk_size.min(rest.len()));
                pulled.fetch_add(chunk.len() as u64, Ordering::SeqCst);
                Some((Ok(chunk), rest))
            }
        });

        Ok(Some(stream.boxed()))
    }

    async fn put(&self, key: &str, bytes: Bytes) -> Result<()> {
        self.objects.insert(key.to_string(), bytes);
        Ok(())
    }
}
