//! Strategy Module
//!
//! Request-handling algorithms that combine a store and the network.
//!
//! # Strategies
//! - `CacheFirst`: serve from the store, fetch and store on a miss
//! - `NetworkFirst`: fetch with a timeout, fall back to the store
//! - `StaleWhileRevalidate`: serve from the store, refresh in the background
//! - `NetworkOnly`: never touches a store

mod cache_first;
pub(crate) mod handler;
mod network_first;
mod network_only;
mod stale_while_revalidate;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::cache::{CacheableResponseFilter, CachedResponse};
use crate::error::{CacheError, Result};
use crate::request::AgentRequest;

pub use cache_first::CacheFirst;
pub use handler::StrategyHandler;
pub use network_first::NetworkFirst;
pub use network_only::NetworkOnly;
pub use stale_while_revalidate::StaleWhileRevalidate;

/// Background network work still running after a response was returned.
/// Resolves to the fetched response; dropping the handle detaches the task.
pub type Revalidation = JoinHandle<Result<CachedResponse>>;

// == Strategy Kind ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
    NetworkOnly,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::CacheFirst => "cache_first",
            StrategyKind::NetworkFirst => "network_first",
            StrategyKind::StaleWhileRevalidate => "stale_while_revalidate",
            StrategyKind::NetworkOnly => "network_only",
        }
    }

    /// Filter used when a route declares no cacheable statuses.
    ///
    /// Cache-first only keeps `200`; the network-backed strategies also keep
    /// opaque responses.
    pub fn default_filter(&self) -> CacheableResponseFilter {
        match self {
            StrategyKind::CacheFirst | StrategyKind::NetworkOnly => {
                CacheableResponseFilter::ok_only()
            }
            StrategyKind::NetworkFirst | StrategyKind::StaleWhileRevalidate => {
                CacheableResponseFilter::ok_and_opaque()
            }
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = CacheError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "cache_first" | "cachefirst" => Ok(StrategyKind::CacheFirst),
            "network_first" | "networkfirst" => Ok(StrategyKind::NetworkFirst),
            "stale_while_revalidate" | "stalewhilerevalidate" => {
                Ok(StrategyKind::StaleWhileRevalidate)
            }
            "network_only" | "networkonly" => Ok(StrategyKind::NetworkOnly),
            _ => Err(CacheError::InvalidRequest(format!("Unknown strategy: {}", s))),
        }
    }
}

// == Response Source ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Cache,
    Network,
}

// == Strategy Response ==
#[derive(Debug)]
pub struct StrategyResponse {
    pub response: CachedResponse,
    pub source: ResponseSource,
    pub revalidation: Option<Revalidation>,
}

impl StrategyResponse {
    pub fn from_cache(response: CachedResponse) -> Self {
        Self {
            response,
            source: ResponseSource::Cache,
            revalidation: None,
        }
    }

    pub fn from_network(response: CachedResponse) -> Self {
        Self {
            response,
            source: ResponseSource::Network,
            revalidation: None,
        }
    }

    pub fn with_revalidation(mut self, revalidation: Option<Revalidation>) -> Self {
        self.revalidation = revalidation;
        self
    }
}

// == Strategy Trait ==
#[async_trait]
pub trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Store backing this strategy, `None` for network-only.
    fn store_name(&self) -> Option<&str>;

    async fn handle(&self, request: &AgentRequest) -> Result<StrategyResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("CacheFirst".parse::<StrategyKind>().unwrap(), StrategyKind::CacheFirst);
        assert_eq!(
            "stale-while-revalidate".parse::<StrategyKind>().unwrap(),
            StrategyKind::StaleWhileRevalidate
        );
        assert_eq!(
            "network_first".parse::<StrategyKind>().unwrap(),
            StrategyKind::NetworkFirst
        );
        assert!("cache_only".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_default_filters() {
        let opaque = CachedResponse::opaque("");
        assert!(!StrategyKind::CacheFirst.default_filter().is_cacheable(&opaque));
        assert!(StrategyKind::NetworkFirst.default_filter().is_cacheable(&opaque));
        assert!(StrategyKind::StaleWhileRevalidate
            .default_filter()
            .is_cacheable(&opaque));
    }

    #[test]
    fn test_kind_serde_names() {
        let json = serde_json::to_string(&StrategyKind::StaleWhileRevalidate).unwrap();
        assert_eq!(json, "\"stale_while_revalidate\"");
        let kind: StrategyKind = serde_json::from_str("\"cache_first\"").unwrap();
        assert_eq!(kind, StrategyKind::CacheFirst);
    }
}
