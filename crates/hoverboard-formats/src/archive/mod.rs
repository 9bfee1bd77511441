//! Archive block streams
//!
//! An archive is an optional header followed by a flat run of block sections:
//!
//! ```text
//! varint(header_len) header
//! varint(len(cid) + len(payload)) cid payload
//! varint(len(cid) + len(payload)) cid payload
//! ...
//! ```
//!
//! The header is carried through untouched. Readers only need it skipped;
//! block locations in sorted indexes point at section starts.

mod writer;

pub use writer::ArchiveWriter;

use bytes::Bytes;
use cid::Cid;

use crate::error::{FormatError, Result};
use crate::link::{Block, Link};
use crate::varint::decode_varint;

/// Parsed prefix of a block section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHead {
    /// Identifier stored in the section
    pub link: Link,
    /// Bytes taken by the length varint and the identifier
    pub header_len: usize,
    /// Payload bytes following the identifier
    pub payload_len: usize,
}

impl BlockHead {
    /// Parse the section prefix at the front of `bytes`
    ///
    /// Only the varint and identifier have to be present; the payload may be
    /// truncated or absent.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let (section_len, varint_len) = decode_varint(bytes)?;
        let section_len = usize::try_from(section_len)
            .map_err(|_| FormatError::InvalidArchive("section length overflow".into()))?;
        if section_len == 0 {
            return Err(FormatError::InvalidArchive("empty block section".into()));
        }

        let mut rest = &bytes[varint_len..];
        let before = rest.len();
        let cid = Cid::read_bytes(&mut rest)?;
        let cid_len = before - rest.len();

        let payload_len = section_len.checked_sub(cid_len).ok_or_else(|| {
            FormatError::InvalidArchive(format!(
                "section length {section_len} shorter than identifier ({cid_len} bytes)"
            ))
        })?;

        Ok(Self {
            link: Link::new(cid),
            header_len: varint_len + cid_len,
            payload_len,
        })
    }

    /// Total section length including the length prefix
    pub const fn section_len(&self) -> usize {
        self.header_len + self.payload_len
    }
}

/// Read one block from a buffer that starts at a section boundary
pub fn read_block(bytes: &Bytes) -> Result<Block> {
    read_section(bytes).map(|(block, _)| block)
}

fn read_section(bytes: &Bytes) -> Result<(Block, usize)> {
    let head = BlockHead::parse(bytes)?;
    let end = head.section_len();
    if bytes.len() < end {
        return Err(FormatError::eof(end, bytes.len()));
    }
    let block = Block {
        link: head.link,
        bytes: bytes.slice(head.header_len..end),
    };
    Ok((block, end))
}

/// Iterator over the blocks of an in-memory archive
///
/// Payloads are zero-copy slices of the source buffer.
#[derive(Debug, Clone)]
pub struct ArchiveReader {
    data: Bytes,
    pos: usize,
    failed: bool,
}

impl ArchiveReader {
    /// Reader over a complete archive, skipping its header
    pub fn new(data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        let (header_len, varint_len) = decode_varint(&data)?;
        let header_len = usize::try_from(header_len)
            .map_err(|_| FormatError::InvalidArchive("header length overflow".into()))?;
        if header_len == 0 {
            return Err(FormatError::InvalidArchive("empty archive header".into()));
        }
        let start = varint_len + header_len;
        if data.len() < start {
            return Err(FormatError::eof(start, data.len()));
        }
        Ok(Self {
            data,
            pos: start,
            failed: false,
        })
    }

    /// Reader over bare block sections with no header
    pub fn without_header(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
            failed: false,
        }
    }

    /// Offset of the next section within the source buffer
    pub const fn position(&self) -> usize {
        self.pos
    }
}

impl Iterator for ArchiveReader {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.data.len() {
            return None;
        }
        match read_section(&self.data.slice(self.pos..)) {
            Ok((block, section_len)) => {
                self.pos += section_len;
                Some(Ok(block))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Decode every block of a complete archive
pub fn decode_archive(data: impl Into<Bytes>) -> Result<Vec<Block>> {
    ArchiveReader::new(data)?.collect()
}
