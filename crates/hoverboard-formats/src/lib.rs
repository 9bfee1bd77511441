//! Content-addressed block formats for hoverboard
//!
//! This crate holds the synchronous, I/O-free half of the block resolver:
//!
//! - **Links**: [`Link`] and [`ArchiveId`] wrappers over CIDs with the
//!   multicodec constants the resolver cares about
//! - **Key translation**: legacy `raw/...` storage keys to canonical
//!   `{archive}/{archive}.archive` keys ([`key`])
//! - **Archives**: length-prefixed block streams, reader and writer ([`archive`])
//! - **Sorted indexes**: multihash-sorted offset tables, reader and builder ([`index`])
//!
//! # Example
//!
//! ```rust
//! use hoverboard_formats::archive::{ArchiveReader, ArchiveWriter};
//! use hoverboard_formats::{Link, codec};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let link = Link::sha2_256(codec::RAW, b"hello")?;
//! let mut writer = ArchiveWriter::new(&[link]);
//! writer.push(&link, b"hello");
//! let bytes = writer.finish();
//!
//! let blocks = ArchiveReader::new(bytes)?.collect::<Result<Vec<_>, _>>()?;
//! assert_eq!(blocks[0].link, link);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]

pub mod archive;
pub mod error;
pub mod index;
pub mod key;
pub mod link;
pub mod varint;

pub use error::{FormatError, Result};
pub use link::{ArchiveId, Block, Link, codec};
