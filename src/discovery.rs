//! In-memory index of payment-gated resources served by `GET /discovery/resources`.
//!
//! The index is seeded at startup from the JSON file named by the
//! `DISCOVERY_RESOURCES` environment variable; when unset the endpoint serves an empty
//! list. Entries are ordered newest first.

use std::env;
use std::fs;

use crate::types::{
    DiscoveredResource, DiscoveryPagination, ListDiscoveryResourcesResponse, X402Version,
};

const ENV_DISCOVERY_RESOURCES: &str = "DISCOVERY_RESOURCES";

pub const DEFAULT_PAGE_LIMIT: usize = 20;
pub const MAX_PAGE_LIMIT: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryIndex {
    resources: Vec<DiscoveredResource>,
}

impl DiscoveryIndex {
    pub fn new(mut resources: Vec<DiscoveredResource>) -> Self {
        resources.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        DiscoveryIndex { resources }
    }

    /// Loads the index from the `DISCOVERY_RESOURCES` file, or empty when unset.
    pub fn from_env() -> Result<Self, DiscoveryError> {
        let Ok(path) = env::var(ENV_DISCOVERY_RESOURCES) else {
            return Ok(DiscoveryIndex::default());
        };
        let content = fs::read_to_string(&path).map_err(|source| DiscoveryError::Read {
            path: path.clone(),
            source,
        })?;
        let resources: Vec<DiscoveredResource> =
            serde_json::from_str(&content).map_err(|source| DiscoveryError::Parse {
                path: path.clone(),
                source,
            })?;
        tracing::info!(count = resources.len(), path, "Loaded discovery resources");
        Ok(DiscoveryIndex::new(resources))
    }

    /// One page of resources, optionally filtered by resource type.
    pub fn list(
        &self,
        type_filter: Option<&str>,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> ListDiscoveryResourcesResponse {
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).min(MAX_PAGE_LIMIT);
        let offset = offset.unwrap_or(0);
        let filtered: Vec<&DiscoveredResource> = self
            .resources
            .iter()
            .filter(|resource| {
                type_filter.is_none_or(|wanted| resource.resource_type == wanted)
            })
            .collect();
        let total = filtered.len();
        let items = filtered
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        ListDiscoveryResourcesResponse {
            x402_version: X402Version::V1,
            items,
            pagination: DiscoveryPagination {
                limit,
                offset,
                total,
            },
        }
    }
}
