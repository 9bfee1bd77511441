//! Pull-style reading over pushed byte streams
//!
//! Object bodies arrive as chunk streams. [`ByteStreamReader`] buffers just
//! enough of them to satisfy each read, so a caller that stops after one
//! block never pulls the rest of the object.

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::stream::Fuse;
use hoverboard_formats::varint::{MAX_VARINT_LEN, decode_varint};
use hoverboard_formats::{Block, FormatError, Link};

use crate::error::{BlockstoreError, Result};
use crate::traits::ByteStream;

/// Longest digest accepted in a streamed identifier
const MAX_DIGEST_LEN: u64 = 64;

pub struct ByteStreamReader {
    stream: Fuse<ByteStream>,
    buf: BytesMut,
    position: u64,
}

impl ByteStreamReader {
    pub fn new(stream: ByteStream) -> Self {
        Self {
            stream: stream.fuse(),
            buf: BytesMut::new(),
            position: 0,
        }
    }

    /// Bytes consumed by reads so far
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Pull chunks until at least `n` bytes are buffered
    async fn fill(&mut self, n: usize) -> Result<()> {
        while self.buf.len() < n {
            match self.stream.next().await {
                Some(chunk) => self.buf.extend_from_slice(&chunk?),
                None => {
                    return Err(FormatError::UnexpectedEof {
                        needed: n,
                        available: self.buf.len(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Whether the stream is exhausted with nothing left buffered
    pub async fn at_end(&mut self) -> Result<bool> {
        while self.buf.is_empty() {
            match self.stream.next().await {
                Some(chunk) => self.buf.extend_from_slice(&chunk?),
                None => return Ok(true),
            }
        }
        Ok(false)
    }

    /// Read exactly `n` bytes, waiting for more chunks as needed
    pub async fn read_exact(&mut self, n: usize) -> Result<Bytes> {
        self.fill(n).await?;
        self.position += n as u64;
        Ok(self.buf.split_to(n).freeze())
    }

    /// Read an unsigned varint
    pub async fn read_varint(&mut self) -> Result<u64> {
        self.read_varint_into(None).await
    }

    async fn read_varint_into(&mut self, mut raw: Option<&mut Vec<u8>>) -> Result<u64> {
        loop {
            match decode_varint(&self.buf) {
                Ok((value, len)) => {
                    let bytes = self.read_exact(len).await?;
                    if let Some(raw) = raw.as_deref_mut() {
                        raw.extend_from_slice(&bytes);
                    }
                    return Ok(value);
                }
                Err(FormatError::UnexpectedEof { .. }) if self.buf.len() < MAX_VARINT_LEN => {
                    let want = self.buf.len() + 1;
                    self.fill(want).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Read a binary block identifier, version 0 or 1
    pub async fn read_link(&mut self) -> Result<Link> {
        self.fill(2).await?;
        if self.buf[0] == 0x12 && self.buf[1] == 0x20 {
            let bytes = self.read_exact(34).await?;
            return Ok(Link::from_bytes(&bytes)?);
        }

        let mut raw = Vec::with_capacity(40);
        let _version = self.read_varint_into(Some(&mut raw)).await?;
        let _codec = self.read_varint_into(Some(&mut raw)).await?;
        let _hash_code = self.read_varint_into(Some(&mut raw)).await?;
        let digest_len = self.read_varint_into(Some(&mut raw)).await?;
        if digest_len > MAX_DIGEST_LEN {
            return Err(FormatError::InvalidArchive(format!(
                "identifier digest of {digest_len} bytes"
            ))
            .into());
        }
        #[allow(clippy::cast_possible_truncation)]
        let digest = self.read_exact(digest_len as usize).await?;
        raw.extend_from_slice(&digest);
        Ok(Link::from_bytes(&raw)?)
    }

    /// Read a block section prefix, returning the identifier and payload length
    pub async fn read_block_head(&mut self) -> Result<(Link, usize)> {
        let section_len = self.read_varint().await?;
        let link = self.read_link().await?;
        let section_len = usize::try_from(section_len)
            .map_err(|_| FormatError::InvalidArchive("section length overflow".into()))?;
        let payload_len = section_len
            .checked_sub(link.encoded_len())
            .ok_or_else(|| {
                FormatError::InvalidArchive(format!(
                    "section length {section_len} shorter than identifier"
                ))
            })?;
        Ok((link, payload_len))
    }
}

/// Lazily decoded blocks of an archive body
///
/// The sequence is finite and cannot be restarted; each call to
/// [`next_block`](Self::next_block) pulls only what that block needs.
pub struct ArchiveBlockStream {
    reader: ByteStreamReader,
    header_pending: bool,
}

impl ArchiveBlockStream {
    /// Blocks of a complete archive, header first
    pub fn new(stream: ByteStream) -> Self {
        Self {
            reader: ByteStreamReader::new(stream),
            header_pending: true,
        }
    }

    pub async fn next_block(&mut self) -> Result<Option<Block>> {
        if self.header_pending {
            let header_len = self.reader.read_varint().await?;
            if header_len == 0 {
                return Err(FormatError::InvalidArchive("empty archive header".into()).into());
            }
            let header_len = usize::try_from(header_len).map_err(|_| {
                BlockstoreError::from(FormatError::InvalidArchive(
                    "header length overflow".into(),
                ))
            })?;
            self.reader.read_exact(header_len).await?;
            self.header_pending = false;
        }

        if self.reader.at_end().await? {
            return Ok(None);
        }
        let (link, payload_len) = self.reader.read_block_head().await?;
        let bytes = self.reader.read_exact(payload_len).await?;
        Ok(Some(Block { link, bytes }))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use hoverboard_formats::archive::ArchiveWriter;
    use hoverboard_formats::codec;
    use pretty_assertions::assert_eq;

    fn chunked(data: &[u8], size: usize) -> ByteStream {
        let chunks: Vec<Result<Bytes>> = data
            .chunks(size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        futures::stream::iter(chunks).boxed()
    }

    fn block(data: &[u8]) -> Block {
        Block::new(Link::sha2_256(codec::RAW, data).unwrap(), data.to_vec())
    }

    #[tokio::test]
    async fn test_read_exact_across_chunks() {
        let mut reader = ByteStreamReader::new(chunked(b"abcdefgh", 3));
        assert_eq!(reader.read_exact(5).await.unwrap().as_ref(), b"abcde");
        assert_eq!(reader.read_exact(3).await.unwrap().as_ref(), b"fgh");
        assert_eq!(reader.position(), 8);
        assert!(reader.at_end().await.unwrap());
    }

    #[tokio::test]
    async fn test_premature_end_is_decode_error() {
        let mut reader = ByteStreamReader::new(chunked(b"abc", 2));
        let err = reader.read_exact(4).await.unwrap_err();
        assert!(matches!(err, BlockstoreError::Decode(FormatError::UnexpectedEof { .. })));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_read_varint_byte_by_byte() {
        let mut reader = ByteStreamReader::new(chunked(&[0xac, 0x02, 0x07], 1));
        assert_eq!(reader.read_varint().await.unwrap(), 300);
        assert_eq!(reader.read_varint().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_read_link_v1_and_v0() {
        let v1 = Link::sha2_256(codec::CAR, b"x").unwrap();
        let v0 = Link::new(cid::Cid::new_v0(*v1.multihash()).unwrap());
        let mut data = v1.to_bytes();
        data.extend_from_slice(&v0.to_bytes());

        let mut reader = ByteStreamReader::new(chunked(&data, 1));
        assert_eq!(reader.read_link().await.unwrap(), v1);
        assert_eq!(reader.read_link().await.unwrap(), v0);
    }

    #[tokio::test]
    async fn test_archive_block_stream() {
        let blocks = vec![block(b"one"), block(b"two"), block(b"three")];
        let mut writer = ArchiveWriter::new(&[blocks[0].link]);
        for b in &blocks {
            writer.push(&b.link, &b.bytes);
        }
        let data = writer.finish();

        let mut stream = ArchiveBlockStream::new(chunked(&data, 7));
        let mut decoded = Vec::new();
        while let Some(b) = stream.next_block().await.unwrap() {
            decoded.push(b);
        }
        assert_eq!(decoded, blocks);
        assert!(stream.next_block().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_archive_block() {
        let b = block(b"payload");
        let mut writer = ArchiveWriter::new(&[]);
        writer.push(&b.link, &b.bytes);
        let data = writer.finish();

        let mut stream = ArchiveBlockStream::new(chunked(&data[..data.len() - 2], 4));
        assert!(matches!(
            stream.next_block().await,
            Err(BlockstoreError::Decode(_))
        ));
    }
}
