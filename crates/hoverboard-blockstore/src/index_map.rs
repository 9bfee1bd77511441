//! Request-scoped map from blocks to their archive locations

use std::collections::HashMap;

use hoverboard_formats::index::decode_sorted_index;
use hoverboard_formats::{ArchiveId, Link};

use crate::error::Result;

/// Where a block sits inside an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLocation {
    /// Archive holding the block
    pub origin: ArchiveId,
    /// Offset of the block section within the archive
    pub offset: u64,
    /// Section length, when the index recorded one
    pub length: Option<u64>,
}

/// Block locations collected while resolving one request
///
/// Keys are normalised to raw-codec links, since index records carry only a
/// digest. The first location recorded for a digest wins; later inserts for
/// the same digest are ignored.
#[derive(Debug, Default)]
pub struct IndexMap {
    entries: HashMap<Link, ArchiveLocation>,
}

impl IndexMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a location unless one exists; returns whether it was inserted
    pub fn insert(&mut self, link: &Link, location: ArchiveLocation) -> bool {
        match self.entries.entry(link.to_raw()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(location);
                true
            }
        }
    }

    pub fn get(&self, link: &Link) -> Option<&ArchiveLocation> {
        self.entries.get(&link.to_raw())
    }

    pub fn contains(&self, link: &Link) -> bool {
        self.entries.contains_key(&link.to_raw())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decode a sorted index of `origin` and record each of its blocks
    ///
    /// Returns the number of new entries.
    pub fn add_sorted_index(&mut self, origin: ArchiveId, index: &[u8]) -> Result<usize> {
        let mut added = 0;
        for record in decode_sorted_index(index)? {
            let location = ArchiveLocation {
                origin,
                offset: record.offset,
                length: record.length,
            };
            if self.insert(&record.link(), location) {
                added += 1;
            }
        }
        Ok(added)
    }
}
