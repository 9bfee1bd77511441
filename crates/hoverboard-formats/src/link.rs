//! Content identifiers
//!
//! A [`Link`] is a CID: a content-type code plus a typed digest. An
//! [`ArchiveId`] is a link whose content type is the archive container.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use cid::Cid;
use cid::multibase::Base;
use cid::multihash::Multihash;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{FormatError, Result};

/// Multicodec codes used by the resolver
pub mod codec {
    /// Raw bytes
    pub const RAW: u64 = 0x55;
    /// Archive container (CAR)
    pub const CAR: u64 = 0x0202;
    /// Multihash-sorted archive index
    pub const MULTIHASH_INDEX_SORTED: u64 = 0x0401;
    /// sha2-256 multihash function code
    pub const SHA2_256: u64 = 0x12;
}

/// Suffix carried by every archive object key
pub const ARCHIVE_SUFFIX: &str = ".archive";

/// Content identifier for a block
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Link(Cid);

impl Link {
    /// Wrap an existing CID
    pub const fn new(cid: Cid) -> Self {
        Self(cid)
    }

    /// Version-1 link with the given codec
    pub const fn from_multihash(codec: u64, multihash: Multihash<64>) -> Self {
        Self(Cid::new_v1(codec, multihash))
    }

    /// Version-1 raw-codec link for a multihash
    pub const fn raw(multihash: Multihash<64>) -> Self {
        Self::from_multihash(codec::RAW, multihash)
    }

    /// Hash `data` with sha2-256 and build a link with the given codec
    pub fn sha2_256(codec: u64, data: &[u8]) -> Result<Self> {
        let digest = Sha256::digest(data);
        let multihash = Multihash::wrap(codec::SHA2_256, &digest)?;
        Ok(Self::from_multihash(codec, multihash))
    }

    /// Parse a binary CID, rejecting trailing bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self(Cid::try_from(bytes)?))
    }

    /// Underlying CID
    pub const fn cid(&self) -> &Cid {
        &self.0
    }

    /// Content-type code
    pub const fn codec(&self) -> u64 {
        self.0.codec()
    }

    /// Digest with its hash function code
    pub const fn multihash(&self) -> &Multihash<64> {
        self.0.hash()
    }

    /// Same digest re-tagged as raw bytes
    ///
    /// Index records carry only digests, so lookups keyed by digest go
    /// through this form.
    pub const fn to_raw(&self) -> Self {
        Self::raw(*self.0.hash())
    }

    /// Whether the content type is the archive container
    pub const fn is_archive(&self) -> bool {
        self.codec() == codec::CAR
    }

    /// Binary CID encoding
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes()
    }

    /// Length of the binary CID encoding
    pub fn encoded_len(&self) -> usize {
        self.0.encoded_len()
    }

    /// Base58btc encoding of the multihash bytes
    ///
    /// This is the stable text form used to query the legacy index and to
    /// key cached index results.
    pub fn digest_base58(&self) -> String {
        Base::Base58Btc.encode(self.multihash().to_bytes())
    }
}

impl From<Cid> for Link {
    fn from(cid: Cid) -> Self {
        Self(cid)
    }
}

impl FromStr for Link {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Self(Cid::try_from(s)?))
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Link({})", self.0)
    }
}

impl Serialize for Link {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Link {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Identifier of an archive container object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchiveId(Link);

impl ArchiveId {
    /// Archive id for a multihash of the archive bytes
    pub const fn from_multihash(multihash: Multihash<64>) -> Self {
        Self(Link::from_multihash(codec::CAR, multihash))
    }

    /// Archive id for the given archive bytes
    pub fn for_bytes(data: &[u8]) -> Result<Self> {
        Ok(Self(Link::sha2_256(codec::CAR, data)?))
    }

    /// The id as a plain link
    pub const fn link(&self) -> &Link {
        &self.0
    }

    /// Canonical object key `{id}/{id}.archive`
    pub fn storage_key(&self) -> String {
        format!("{id}/{id}{ARCHIVE_SUFFIX}", id = self.0)
    }
}

impl TryFrom<Link> for ArchiveId {
    type Error = FormatError;

    fn try_from(link: Link) -> Result<Self> {
        if link.is_archive() {
            Ok(Self(link))
        } else {
            Err(FormatError::UnexpectedCodec {
                expected: codec::CAR,
                actual: link.codec(),
            })
        }
    }
}

impl fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for ArchiveId {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self> {
        Self::try_from(s.parse::<Link>()?)
    }
}

/// A block and the link it was stored under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Block identifier
    pub link: Link,
    /// Block payload
    pub bytes: Bytes,
}

impl Block {
    /// Create a block
    pub fn new(link: Link, bytes: impl Into<Bytes>) -> Self {
        Self {
            link,
            bytes: bytes.into(),
        }
    }
}
