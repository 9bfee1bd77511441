//! Content-addressed block resolution for hoverboard
//!
//! Every resolver implements [`Blockstore`] (`has` and `get`), so layers
//! compose as decorators:
//!
//! - [`ByteCache`] answers from a response cache and refills it
//! - [`MultiBackendFetcher`] resolves through the legacy index
//!   ([`RemoteIndex`], usually wrapped in [`CachingIndexLookup`]), trying the
//!   primary store before region-scoped fallbacks
//! - [`ClaimsResolver`] resolves through content claims, reading single
//!   blocks out of remote archives with [`RangeArchiveReader`]
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use hoverboard_blockstore::{
//!     Blockstore, BlockstoreConfig, ByteCache, CachingIndexLookup, ExecutionContext,
//!     IndexQuery, IndexRow, MemoryObjectStore, MemoryResponseCache, Metrics,
//!     MultiBackendFetcher, RemoteIndex,
//! };
//! use hoverboard_formats::{Link, codec};
//!
//! struct EmptyTable;
//!
//! #[async_trait::async_trait]
//! impl IndexQuery for EmptyTable {
//!     async fn query(&self, _digest: &str, _limit: usize) -> hoverboard_blockstore::Result<Vec<IndexRow>> {
//!         Ok(Vec::new())
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BlockstoreConfig::from_env()?;
//! let ctx = ExecutionContext::new();
//! let metrics = Metrics::new()?;
//! let cache = Arc::new(MemoryResponseCache::new());
//!
//! let index = CachingIndexLookup::new(
//!     RemoteIndex::new(Arc::new(EmptyTable), &config),
//!     cache.clone(),
//!     ctx.clone(),
//!     config.index_table.clone(),
//! );
//! let fetcher = MultiBackendFetcher::new(index, metrics.clone())
//!     .with_primary(Arc::new(MemoryObjectStore::new()));
//! let store = ByteCache::new(fetcher, cache, ctx.clone(), metrics);
//!
//! let link = Link::sha2_256(codec::RAW, b"hello")?;
//! let _bytes = store.get(&link).await?;
//! ctx.drain().await;
//! # Ok(())
//! # }
//! ```

pub mod byte_cache;
pub mod cache;
pub mod claims;
pub mod config;
pub mod context;
pub mod error;
pub mod fetcher;
pub mod index;
pub mod index_map;
pub mod metrics;
pub mod range_reader;
pub mod retry;
pub mod store;
pub mod stream;
pub mod traits;
pub mod transport;

pub use byte_cache::ByteCache;
pub use cache::MemoryResponseCache;
pub use claims::{Claim, ClaimsResolver, LocationClaim, RelationClaim, RelationPart};
pub use config::BlockstoreConfig;
pub use context::ExecutionContext;
pub use error::{BlockstoreError, Result};
pub use fetcher::MultiBackendFetcher;
pub use index::{CachingIndexLookup, IndexEntry, RemoteIndex};
pub use index_map::{ArchiveLocation, IndexMap};
pub use metrics::{Metrics, MetricsSnapshot, Tier};
pub use range_reader::RangeArchiveReader;
pub use retry::RetryPolicy;
pub use store::{HttpObjectStore, MemoryObjectStore};
pub use stream::{ArchiveBlockStream, ByteStreamReader};
pub use traits::{
    Blockstore, ByteRange, ByteStream, ClaimsClient, IndexLookup, IndexQuery, IndexRow,
    ObjectStore, ResponseCache,
};
pub use transport::HttpTransport;
