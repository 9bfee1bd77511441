//! Error types for format parsing and key translation

use thiserror::Error;

/// Format operation result type
pub type Result<T> = std::result::Result<T, FormatError>;

/// Errors raised while decoding identifiers, keys, archives and indexes
///
/// Every variant describes malformed input. None of them are transient, so
/// callers should never retry an operation that failed with a `FormatError`.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Input ended before a complete value could be read
    #[error("Unexpected end of data: needed {needed} bytes, {available} available")]
    UnexpectedEof {
        /// Number of bytes the parser needed
        needed: usize,
        /// Number of bytes that were left
        available: usize,
    },

    /// Unsigned varint did not terminate within 63 bits
    #[error("Varint overflow")]
    VarintOverflow,

    /// Block identifier could not be parsed
    #[error("Invalid CID: {0}")]
    InvalidCid(#[from] cid::Error),

    /// Multihash could not be parsed or built
    #[error("Invalid multihash: {0}")]
    InvalidMultihash(#[from] cid::multihash::Error),

    /// Base-32 digest string could not be decoded
    #[error("Invalid base32 digest '{input}': {reason}")]
    InvalidBase32 {
        /// The rejected input
        input: String,
        /// Decoder message
        reason: String,
    },

    /// Identifier carried a different content type than required
    #[error("Unexpected codec: expected 0x{expected:x}, got 0x{actual:x}")]
    UnexpectedCodec {
        /// Required multicodec
        expected: u64,
        /// Multicodec found in the input
        actual: u64,
    },

    /// Archive stream is structurally invalid
    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    /// Sorted index is structurally invalid
    #[error("Invalid index: {0}")]
    InvalidIndex(String),
}

impl FormatError {
    pub(crate) const fn eof(needed: usize, available: usize) -> Self {
        Self::UnexpectedEof { needed, available }
    }
}
