use std::collections::BTreeMap;

use bytes::{BufMut, Bytes, BytesMut};
use cid::multihash::Multihash;

use crate::link::codec;
use crate::varint::encode_varint;

/// Accumulates `(digest, offset)` pairs and encodes a sorted index
#[derive(Debug, Default)]
pub struct SortedIndexBuilder {
    // code -> width -> (digest, offset)
    groups: BTreeMap<u64, BTreeMap<u32, Vec<(Vec<u8>, u64)>>>,
}

impl SortedIndexBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a block section offset for a digest
    pub fn insert(&mut self, multihash: Multihash<64>, offset: u64) {
        let digest = multihash.digest().to_vec();
        let width = digest.len() as u32 + 8;
        self.groups
            .entry(multihash.code())
            .or_default()
            .entry(width)
            .or_default()
            .push((digest, offset));
    }

    /// Encode the index, sorting each bucket by digest
    pub fn build(mut self) -> Bytes {
        let mut buf = BytesMut::new();
        let mut prefix = Vec::new();
        encode_varint(codec::MULTIHASH_INDEX_SORTED, &mut prefix);
        buf.put_slice(&prefix);

        buf.put_u32_le(self.groups.len() as u32);
        for (code, buckets) in &mut self.groups {
            buf.put_u64_le(*code);
            buf.put_u32_le(buckets.len() as u32);
            for (width, records) in buckets.iter_mut() {
                records.sort_unstable();
                buf.put_u32_le(*width);
                buf.put_u64_le(u64::from(*width) * records.len() as u64);
                for (digest, offset) in records.iter() {
                    buf.put_slice(digest);
                    buf.put_u64_le(*offset);
                }
            }
        }
        buf.freeze()
    }
}
