//! Block serving counters
//!
//! Every block handed back to a caller is counted once in the totals and
//! once under the tier that produced it.

use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use serde::{Deserialize, Serialize};

use crate::error::{BlockstoreError, Result};

/// Source that produced a served block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Byte-level response cache
    Cache,
    /// Fast primary object store
    Primary,
    /// Region-scoped fallback object stores
    Fallback,
    /// Claims resolution path
    Claims,
}

#[derive(Debug, Clone)]
struct TierCounters {
    blocks: IntCounter,
    bytes: IntCounter,
}

impl TierCounters {
    fn register(registry: &Registry, name: &str, help: &str) -> Result<Self> {
        let blocks = IntCounter::new(
            format!("hoverboard_{name}_blocks_total"),
            format!("Blocks served {help}"),
        )?;
        registry.register(Box::new(blocks.clone()))?;

        let bytes = IntCounter::new(
            format!("hoverboard_{name}_block_bytes_total"),
            format!("Block bytes served {help}"),
        )?;
        registry.register(Box::new(bytes.clone()))?;

        Ok(Self { blocks, bytes })
    }

    fn inc(&self, bytes: u64) {
        self.blocks.inc();
        self.bytes.inc_by(bytes);
    }
}

/// Prometheus counters for served blocks
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    total: TierCounters,
    cache: TierCounters,
    primary: TierCounters,
    fallback: TierCounters,
    claims: TierCounters,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub blocks: u64,
    pub block_bytes: u64,
    pub blocks_cached: u64,
    pub block_bytes_cached: u64,
    pub blocks_primary: u64,
    pub block_bytes_primary: u64,
    pub blocks_fallback: u64,
    pub block_bytes_fallback: u64,
    pub blocks_claims: u64,
    pub block_bytes_claims: u64,
}

impl Metrics {
    /// Create counters in a fresh registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        Ok(Self {
            total: TierCounters::register(&registry, "served", "in total")?,
            cache: TierCounters::register(&registry, "cache", "from the response cache")?,
            primary: TierCounters::register(&registry, "primary", "from the primary store")?,
            fallback: TierCounters::register(&registry, "fallback", "from regional stores")?,
            claims: TierCounters::register(&registry, "claims", "via content claims")?,
            registry,
        })
    }

    /// Count one block of `bytes` length served from `tier`
    pub fn record(&self, tier: Tier, bytes: usize) {
        let bytes = bytes as u64;
        self.total.inc(bytes);
        match tier {
            Tier::Cache => self.cache.inc(bytes),
            Tier::Primary => self.primary.inc(bytes),
            Tier::Fallback => self.fallback.inc(bytes),
            Tier::Claims => self.claims.inc(bytes),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            blocks: self.total.blocks.get(),
            block_bytes: self.total.bytes.get(),
            blocks_cached: self.cache.blocks.get(),
            block_bytes_cached: self.cache.bytes.get(),
            blocks_primary: self.primary.blocks.get(),
            block_bytes_primary: self.primary.bytes.get(),
            blocks_fallback: self.fallback.blocks.get(),
            block_bytes_fallback: self.fallback.bytes.get(),
            blocks_claims: self.claims.blocks.get(),
            block_bytes_claims: self.claims.bytes.get(),
        }
    }

    /// Registry holding every counter, for exposition by the caller
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the registry in the Prometheus text format
    pub fn gather_text(&self) -> Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| BlockstoreError::backend(e.to_string()))
    }
}
