//! Shared fixtures for integration tests

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use cid::multibase::Base;
use hoverboard_blockstore::{Claim, ClaimsClient, IndexQuery, IndexRow, Result};
use hoverboard_formats::archive::ArchiveWriter;
use hoverboard_formats::index::SortedIndexBuilder;
use hoverboard_formats::{ArchiveId, Block, Link, codec};
use url::Url;

/// Install a test subscriber honouring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn raw_block(data: &[u8]) -> Block {
    Block::new(Link::sha2_256(codec::RAW, data).unwrap(), data.to_vec())
}

/// An archive plus the positions of everything written into it
pub struct TestArchive {
    pub id: ArchiveId,
    pub data: Bytes,
    pub blocks: Vec<Block>,
    /// `(offset, length)` of each block section
    pub sections: Vec<(u64, u64)>,
    /// `(offset, length)` of each block payload
    pub payloads: Vec<(u64, u64)>,
}

impl TestArchive {
    pub fn new(blocks: Vec<Block>) -> Self {
        let roots: Vec<Link> = blocks.first().map(|b| b.link).into_iter().collect();
        let mut writer = ArchiveWriter::new(&roots);
        let mut sections = Vec::new();
        let mut payloads = Vec::new();
        for b in &blocks {
            let start = writer.push(&b.link, &b.bytes);
            let end = writer.len() as u64;
            sections.push((start, end - start));
            payloads.push((end - b.bytes.len() as u64, b.bytes.len() as u64));
        }
        let data = writer.finish();

        Self {
            id: ArchiveId::for_bytes(&data).unwrap(),
            data,
            blocks,
            sections,
            payloads,
        }
    }

    /// Sorted index of the blocks at positions `which`
    pub fn index_of(&self, which: &[usize]) -> Block {
        let mut builder = SortedIndexBuilder::new();
        for &i in which {
            builder.insert(*self.blocks[i].link.multihash(), self.sections[i].0);
        }
        let bytes = builder.build();
        let link = Link::sha2_256(codec::MULTIHASH_INDEX_SORTED, &bytes).unwrap();
        Block::new(link, bytes)
    }

    /// Legacy `raw/...` key naming this archive
    pub fn legacy_key(&self) -> String {
        let digest = Base::Base32Lower.encode(self.id.link().multihash().to_bytes());
        format!("raw/bafkreiroot/315318734258473269/{digest}.archive")
    }
}

/// Index table keyed by base58btc multihash, counting queries
#[derive(Default)]
pub struct TableQuery {
    rows: HashMap<String, Vec<IndexRow>>,
    calls: AtomicUsize,
}

impl TableQuery {
    pub fn insert(&mut self, link: &Link, carpath: &str, (offset, length): (u64, u64)) {
        self.rows
            .entry(link.digest_base58())
            .or_default()
            .push(IndexRow {
                carpath: carpath.to_string(),
                offset,
                length,
            });
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexQuery for TableQuery {
    async fn query(&self, digest: &str, limit: usize) -> Result<Vec<IndexRow>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.get(digest).cloned().unwrap_or_default();
        rows.truncate(limit);
        Ok(rows)
    }
}

/// Claims service answering from a fixed table
#[derive(Default)]
pub struct StaticClaims {
    claims: HashMap<Link, Vec<Claim>>,
}

impl StaticClaims {
    pub fn insert(&mut self, link: Link, claim: Claim) {
        self.claims.entry(link).or_default().push(claim);
    }
}

#[async_trait]
impl ClaimsClient for StaticClaims {
    async fn read(&self, link: &Link, _service_url: Option<&Url>) -> Result<Vec<Claim>> {
        Ok(self.claims.get(link).cloned().unwrap_or_default())
    }
}
