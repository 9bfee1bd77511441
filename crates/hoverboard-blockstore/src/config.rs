//! Configuration for the block resolution engine

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::{BlockstoreError, Result};
use crate::retry::RetryPolicy;

/// Default index candidates returned per link
pub const DEFAULT_MAX_INDEX_ENTRIES: usize = 5;

/// Regions with a fallback object store, in preference order
pub const DEFAULT_REGIONS: &[&str] = &["us-west-2", "us-east-1", "us-east-2"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockstoreConfig {
    /// Legacy index table; also namespaces cached index results
    pub index_table: String,

    /// Maximum index candidates fetched per link
    pub max_index_entries: usize,

    /// Region whose candidates are tried first
    pub preferred_region: Option<String>,

    /// Regions with a fallback object store
    pub regions: Vec<String>,

    /// Fallback region for candidates in an unknown region
    pub default_region: Option<String>,

    /// Claims service endpoint, `None` for the client default
    pub claims_service_url: Option<Url>,

    /// Per-request timeout for HTTP collaborators
    pub request_timeout: Duration,

    /// Retry policy for index queries
    pub retry_policy: RetryPolicy,
}

impl Default for BlockstoreConfig {
    fn default() -> Self {
        Self {
            index_table: "blocks-cars-position".to_string(),
            max_index_entries: DEFAULT_MAX_INDEX_ENTRIES,
            preferred_region: None,
            regions: DEFAULT_REGIONS.iter().map(ToString::to_string).collect(),
            default_region: None,
            claims_service_url: None,
            request_timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl BlockstoreConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Create configuration from `HOVERBOARD_*` variables looked up by `var`
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            index_table: var("HOVERBOARD_INDEX_TABLE").unwrap_or(defaults.index_table),
            max_index_entries: var("HOVERBOARD_MAX_INDEX_ENTRIES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_INDEX_ENTRIES),
            preferred_region: var("HOVERBOARD_PREFERRED_REGION")
                .filter(|s| !s.is_empty()),
            regions: var("HOVERBOARD_REGIONS")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .map(ToString::to_string)
                        .collect()
                })
                .unwrap_or(defaults.regions),
            default_region: var("HOVERBOARD_DEFAULT_REGION")
                .filter(|s| !s.is_empty()),
            claims_service_url: var("HOVERBOARD_CLAIMS_SERVICE_URL")
                .filter(|s| !s.is_empty())
                .map(|s| Url::parse(&s))
                .transpose()
                .map_err(|e| BlockstoreError::Config(format!("claims service URL: {e}")))?,
            request_timeout: Duration::from_secs(
                var("HOVERBOARD_REQUEST_TIMEOUT")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            retry_policy: RetryPolicy::from_vars(&var)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.max_index_entries == 0 {
            return Err(BlockstoreError::Config(
                "max_index_entries must be at least 1".to_string(),
            ));
        }
        if self.regions.is_empty() {
            return Err(BlockstoreError::Config(
                "at least one region is required".to_string(),
            ));
        }
        if let Some(region) = &self.default_region
            && !self.regions.contains(region)
        {
            return Err(BlockstoreError::Config(format!(
                "default region {region} is not a configured region"
            )));
        }
        self.retry_policy.validate()
    }

    /// Region used when a candidate's own region has no store
    pub fn default_region(&self) -> Option<&str> {
        self.default_region
            .as_deref()
            .or_else(|| self.regions.first().map(String::as_str))
    }
}
