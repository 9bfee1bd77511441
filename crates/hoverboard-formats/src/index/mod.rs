//! Multihash-sorted archive indexes
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! varint(0x0401)
//! u32 group_count
//!   u64 multihash_code
//!   u32 bucket_count
//!     u32 width            digest length + 8
//!     u64 data_length      width * record_count
//!     [digest || u64 offset] * record_count, sorted by digest
//! ```
//!
//! Offsets point at the start of a block section inside the origin archive.

mod builder;

pub use builder::SortedIndexBuilder;

use cid::multihash::Multihash;

use crate::error::{FormatError, Result};
use crate::link::{Link, codec};
use crate::varint::decode_varint;

/// Location of one block inside an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRecord {
    /// Digest of the block
    pub multihash: Multihash<64>,
    /// Offset of the block section
    pub offset: u64,
    /// Section length when the index format carries one
    pub length: Option<u64>,
}

impl IndexRecord {
    /// Raw-codec link for the record's digest
    pub const fn link(&self) -> Link {
        Link::raw(self.multihash)
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let available = self.data.len() - self.pos;
        if available < n {
            return Err(FormatError::eof(n, available));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn varint(&mut self) -> Result<u64> {
        let (value, len) = decode_varint(&self.data[self.pos..])?;
        self.pos += len;
        Ok(value)
    }

    const fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

/// Decode a sorted index block into its records
pub fn decode_sorted_index(bytes: &[u8]) -> Result<Vec<IndexRecord>> {
    let mut cur = Cursor::new(bytes);

    let format = cur.varint()?;
    if format != codec::MULTIHASH_INDEX_SORTED {
        return Err(FormatError::UnexpectedCodec {
            expected: codec::MULTIHASH_INDEX_SORTED,
            actual: format,
        });
    }

    let mut records = Vec::new();
    let groups = cur.u32()?;
    for _ in 0..groups {
        let code = cur.u64()?;
        let buckets = cur.u32()?;
        for _ in 0..buckets {
            let width = cur.u32()? as usize;
            let data_len = usize::try_from(cur.u64()?)
                .map_err(|_| FormatError::InvalidIndex("bucket length overflow".into()))?;
            if width <= 8 {
                return Err(FormatError::InvalidIndex(format!(
                    "record width {width} leaves no room for a digest"
                )));
            }
            if data_len % width != 0 {
                return Err(FormatError::InvalidIndex(format!(
                    "bucket length {data_len} is not a multiple of width {width}"
                )));
            }

            for record in cur.take(data_len)?.chunks_exact(width) {
                let (digest, offset) = record.split_at(width - 8);
                let mut buf = [0u8; 8];
                buf.copy_from_slice(offset);
                records.push(IndexRecord {
                    multihash: Multihash::wrap(code, digest)?,
                    offset: u64::from_le_bytes(buf),
                    length: None,
                });
            }
        }
    }

    if cur.remaining() != 0 {
        return Err(FormatError::InvalidIndex(format!(
            "{} trailing bytes after index",
            cur.remaining()
        )));
    }

    Ok(records)
}
