//! Content claims and their resolution
//!
//! A claim asserts where a block can be retrieved from: either directly at
//! a URL ([`LocationClaim`]) or as part of an archive described by a sorted
//! index ([`RelationClaim`]).

mod resolver;

pub use resolver::ClaimsResolver;

use hoverboard_formats::{Block, Link};
use serde::{Deserialize, Serialize};
use url::Url;

/// Media type requested from location URLs
pub const ARCHIVE_MEDIA_TYPE: &str = "application/vnd.ipld.car";

/// One claim returned by the claims service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Claim {
    #[serde(rename = "assert/location")]
    Location(LocationClaim),

    #[serde(rename = "assert/relation")]
    Relation(RelationClaim),

    /// Any claim type this resolver does not act on
    #[serde(other)]
    Unknown,
}

/// The content is retrievable at each of the listed URLs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationClaim {
    /// Claimed content
    pub content: Link,
    /// URLs serving an archive whose first block is the content
    pub location: Vec<Url>,
}

/// The content is made of parts, each with an optional index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationClaim {
    /// Claimed content
    pub content: Link,
    /// Links the content refers to
    #[serde(default)]
    pub children: Vec<Link>,
    /// Archives that together hold the content
    pub parts: Vec<RelationPart>,
    /// Blocks exported alongside the claim itself
    ///
    /// Claims clients attach these after decoding the claim envelope; they
    /// are not part of the JSON form.
    #[serde(skip)]
    pub blocks: Vec<Block>,
}

impl RelationClaim {
    /// Exported block whose digest matches `link`
    pub fn exported_block(&self, link: &Link) -> Option<&Block> {
        self.blocks
            .iter()
            .find(|b| b.link.multihash() == link.multihash())
    }
}

/// One archive of a relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationPart {
    /// The archive
    pub content: Link,
    /// Index describing the archive, if one was published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub includes: Option<Inclusion>,
}

/// Where the index of a relation part lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inclusion {
    /// The index block
    pub content: Link,
    /// Archives that carry the index block, when it was not exported inline
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<Link>,
}
