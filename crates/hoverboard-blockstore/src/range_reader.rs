//! Single-block reads from remote archives

use async_trait::async_trait;
use bytes::Bytes;
use hoverboard_formats::{Block, Link};
use tracing::debug;

use crate::error::{BlockstoreError, Result};
use crate::index_map::IndexMap;
use crate::stream::ByteStreamReader;
use crate::traits::{Blockstore, ByteRange, ObjectStore};

/// Reads one block out of an archive object using an [`IndexMap`]
///
/// The read starts at the recorded section offset and is open-ended; the
/// block length comes from the section header, not the index. The body
/// stream is dropped as soon as the payload has been read.
pub struct RangeArchiveReader<'a> {
    store: &'a dyn ObjectStore,
    index: &'a IndexMap,
}

impl<'a> RangeArchiveReader<'a> {
    /// Reader over archives in `store` located through `index`
    pub fn new(store: &'a dyn ObjectStore, index: &'a IndexMap) -> Self {
        Self { store, index }
    }

    /// Fetch `link`, failing with `NotFound` if it is not indexed or the
    /// archive object is missing
    pub async fn get_block(&self, link: &Link) -> Result<Block> {
        let location = self
            .index
            .get(link)
            .ok_or_else(|| BlockstoreError::not_found(link))?;

        let key = location.origin.storage_key();
        debug!(%link, %key, offset = location.offset, "Range read from archive");

        let stream = self
            .store
            .get(&key, Some(ByteRange::starting_at(location.offset)))
            .await?
            .ok_or_else(|| BlockstoreError::not_found(&key))?;

        let mut reader = ByteStreamReader::new(stream);
        let (_, payload_len) = reader.read_block_head().await?;
        let bytes = reader.read_exact(payload_len).await?;
        drop(reader);

        Ok(Block { link: *link, bytes })
    }
}

#[async_trait]
impl<'a> Blockstore for RangeArchiveReader<'a> {
    async fn has(&self, link: &Link) -> Result<bool> {
        Ok(self.index.contains(link))
    }

    async fn get(&self, link: &Link) -> Result<Option<Bytes>> {
        match self.get_block(link).await {
            Ok(block) => Ok(Some(block.bytes)),
            Err(BlockstoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
