//! Unsigned LEB128 varints as used by multiformats and archive sections

use crate::error::{FormatError, Result};

/// Longest encoding accepted for a 63-bit multiformats varint
pub const MAX_VARINT_LEN: usize = 9;

/// Decode a varint from the front of `bytes`
///
/// Returns the value and the number of bytes it occupied. Encodings longer
/// than [`MAX_VARINT_LEN`] bytes are rejected as overflow.
pub fn decode_varint(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut value = 0u64;
    let mut shift = 0u32;
    for (idx, b) in bytes.iter().enumerate() {
        let byte = u64::from(*b);
        if byte < 0x80 {
            value |= byte << shift;
            return Ok((value, idx + 1));
        }
        value |= (byte & 0x7f) << shift;
        shift += 7;
        if idx + 1 >= MAX_VARINT_LEN {
            return Err(FormatError::VarintOverflow);
        }
    }
    Err(FormatError::eof(bytes.len() + 1, bytes.len()))
}

/// Append the varint encoding of `value` to `out`
pub fn encode_varint(mut value: u64, out: &mut Vec<u8>) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Number of bytes `encode_varint` would write for `value`
pub const fn varint_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}
