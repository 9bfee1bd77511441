use bytes::{BufMut, Bytes, BytesMut};

use crate::link::Link;
use crate::varint::encode_varint;

const CBOR_BYTES: u8 = 0x40;
const CBOR_TEXT: u8 = 0x60;
const CBOR_ARRAY: u8 = 0x80;
const CBOR_MAP: u8 = 0xa0;
const CBOR_LINK_TAG: [u8; 2] = [0xd8, 0x2a];

/// Builds an archive in memory
///
/// Used to produce archives for storage and fixtures; the resolver itself
/// only reads them.
#[derive(Debug)]
pub struct ArchiveWriter {
    buf: BytesMut,
}

impl ArchiveWriter {
    /// Start an archive with a version-1 header naming `roots`
    pub fn new(roots: &[Link]) -> Self {
        let mut header = Vec::new();
        header.push(CBOR_MAP | 2);
        cbor_head(&mut header, CBOR_TEXT, 5);
        header.extend_from_slice(b"roots");
        cbor_head(&mut header, CBOR_ARRAY, roots.len() as u64);
        for root in roots {
            let cid = root.to_bytes();
            header.extend_from_slice(&CBOR_LINK_TAG);
            cbor_head(&mut header, CBOR_BYTES, cid.len() as u64 + 1);
            header.push(0x00);
            header.extend_from_slice(&cid);
        }
        cbor_head(&mut header, CBOR_TEXT, 7);
        header.extend_from_slice(b"version");
        header.push(0x01);

        let mut prefix = Vec::new();
        encode_varint(header.len() as u64, &mut prefix);

        let mut buf = BytesMut::with_capacity(prefix.len() + header.len());
        buf.put_slice(&prefix);
        buf.put_slice(&header);
        Self { buf }
    }

    /// Append a block section and return the offset it starts at
    pub fn push(&mut self, link: &Link, payload: &[u8]) -> u64 {
        let offset = self.buf.len() as u64;
        let cid = link.to_bytes();
        let mut prefix = Vec::new();
        encode_varint((cid.len() + payload.len()) as u64, &mut prefix);
        self.buf.put_slice(&prefix);
        self.buf.put_slice(&cid);
        self.buf.put_slice(payload);
        offset
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written, which is never the case after `new`
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish the archive
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

fn cbor_head(out: &mut Vec<u8>, major: u8, len: u64) {
    match len {
        0..=23 => out.push(major | len as u8),
        24..=0xff => {
            out.push(major | 24);
            out.push(len as u8);
        }
        0x100..=0xffff => {
            out.push(major | 25);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        }
        _ => {
            out.push(major | 26);
            out.extend_from_slice(&(len as u32).to_be_bytes());
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::link::codec;

    #[test]
    fn test_empty_roots_header() {
        let bytes = ArchiveWriter::new(&[]).finish();
        let mut expected = vec![0x11, 0xa2, 0x65];
        expected.extend_from_slice(b"roots");
        expected.push(0x80);
        expected.push(0x67);
        expected.extend_from_slice(b"version");
        expected.push(0x01);

        assert_eq!(bytes.as_ref(), expected.as_slice());
    }

    #[test]
    fn test_root_is_tagged_link() {
        let root = Link::sha2_256(codec::RAW, b"root").unwrap();
        let bytes = ArchiveWriter::new(&[root]).finish();
        let cid = root.to_bytes();

        let tag_at = bytes
            .windows(2)
            .position(|w| w == CBOR_LINK_TAG)
            .expect("link tag present");
        assert_eq!(bytes[tag_at + 2], CBOR_BYTES | 24);
        assert_eq!(usize::from(bytes[tag_at + 3]), cid.len() + 1);
        assert_eq!(bytes[tag_at + 4], 0x00);
        assert_eq!(&bytes[tag_at + 5..tag_at + 5 + cid.len()], cid.as_slice());
    }

    #[test]
    fn test_push_offsets_are_contiguous() {
        let a = Link::sha2_256(codec::RAW, b"a").unwrap();
        let b = Link::sha2_256(codec::RAW, b"bb").unwrap();
        let mut writer = ArchiveWriter::new(&[a]);
        let header_len = writer.len() as u64;

        let first = writer.push(&a, b"a");
        let second = writer.push(&b, b"bb");

        assert_eq!(first, header_len);
        assert_eq!(second, first + 1 + a.encoded_len() as u64 + 1);
        assert_eq!(writer.len() as u64, second + 1 + b.encoded_len() as u64 + 2);
    }
}
