//! Caching Policy
//!
//! Declarative description of a deployment: version, precache manifest,
//! route table and lifecycle flags. Loaded from JSON or taken from the
//! built-in site policy.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::{CacheStorage, CacheableResponseFilter, ExpirationPolicy, SharedStats};
use crate::error::{CacheError, Result};
use crate::lifecycle::{LifecycleOptions, PrecacheEntry};
use crate::network::NetworkFetcher;
use crate::routing::{Matcher, Route, Router};
use crate::strategy::{
    CacheFirst, NetworkFirst, NetworkOnly, StaleWhileRevalidate, Strategy, StrategyHandler,
    StrategyKind,
};

const THIRTY_DAYS_SECS: u64 = 30 * 24 * 60 * 60;

/// How a route selects requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteMatch {
    /// Regex tested against the full URL
    Regex(String),
    /// Navigation requests
    Navigation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    #[serde(rename = "match")]
    pub matcher: RouteMatch,
    pub strategy: StrategyKind,
    /// Store backing the route; required unless network-only
    #[serde(default)]
    pub cache_name: Option<String>,
    #[serde(default)]
    pub max_entries: Option<usize>,
    #[serde(default)]
    pub max_age_seconds: Option<u64>,
    /// Overrides the strategy's default cacheable statuses
    #[serde(default)]
    pub cacheable_statuses: Option<Vec<u16>>,
    #[serde(default)]
    pub vary_headers: Vec<String>,
    /// Network-first only; falls back to the agent-wide timeout
    #[serde(default)]
    pub network_timeout_seconds: Option<u64>,
}

impl RouteConfig {
    fn new(matcher: RouteMatch, strategy: StrategyKind, cache_name: &str) -> Self {
        Self {
            matcher,
            strategy,
            cache_name: Some(cache_name.to_string()),
            max_entries: None,
            max_age_seconds: None,
            cacheable_statuses: None,
            vary_headers: Vec::new(),
            network_timeout_seconds: None,
        }
    }

    pub fn expiration(&self) -> ExpirationPolicy {
        ExpirationPolicy::new(self.max_entries, self.max_age_seconds)
    }

    pub fn filter(&self) -> CacheableResponseFilter {
        match &self.cacheable_statuses {
            Some(statuses) => CacheableResponseFilter::new(statuses.iter().copied()),
            None => self.strategy.default_filter(),
        }
    }

    fn validate(&self) -> Result<()> {
        if let RouteMatch::Regex(pattern) = &self.matcher {
            regex::Regex::new(pattern).map_err(|e| {
                CacheError::InvalidRequest(format!("Invalid route pattern '{}': {}", pattern, e))
            })?;
        }
        if self.strategy != StrategyKind::NetworkOnly
            && self.cache_name.as_deref().map_or(true, str::is_empty)
        {
            return Err(CacheError::InvalidRequest(format!(
                "Route {:?} uses {} but names no cache",
                self.matcher, self.strategy
            )));
        }
        if self.max_entries == Some(0) {
            return Err(CacheError::InvalidRequest(
                "max_entries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// == Agent Policy ==
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPolicy {
    pub version: String,
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,
    #[serde(default)]
    pub precache: Vec<PrecacheEntry>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
    #[serde(default)]
    pub skip_waiting: bool,
    #[serde(default)]
    pub clients_claim: bool,
    #[serde(default)]
    pub cleanup_outdated_caches: bool,
}

fn default_cache_prefix() -> String {
    "offline".to_string()
}

impl Default for AgentPolicy {
    /// The site policy: critical pages precached, static assets
    /// cache-first, pages network-first, API data stale-while-revalidate.
    fn default() -> Self {
        let assets = RouteConfig {
            max_entries: Some(60),
            max_age_seconds: Some(THIRTY_DAYS_SECS),
            cacheable_statuses: Some(vec![0, 200]),
            ..RouteConfig::new(
                RouteMatch::Regex(r"\.(?:js|css|png|gif|jpg|jpeg|svg|woff|woff2|ttf|eot)$".into()),
                StrategyKind::CacheFirst,
                "site-static-assets",
            )
        };
        let pages = RouteConfig {
            cacheable_statuses: Some(vec![200]),
            ..RouteConfig::new(RouteMatch::Navigation, StrategyKind::NetworkFirst, "site-pages")
        };
        let api = RouteConfig::new(
            RouteMatch::Regex(r".*/api/.*".into()),
            StrategyKind::StaleWhileRevalidate,
            "site-api-data",
        );

        Self {
            version: "1.0.5".to_string(),
            cache_prefix: default_cache_prefix(),
            precache: vec![
                PrecacheEntry::new("./index.html", "1.0.5"),
                PrecacheEntry::new("./", "1.0.5"),
                PrecacheEntry::new(
                    "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.0.0/css/all.min.css",
                    "1.0.0",
                ),
                PrecacheEntry::new(
                    "https://cdnjs.cloudflare.com/ajax/libs/html2canvas/1.4.1/html2canvas.min.js",
                    "1.0.0",
                ),
            ],
            routes: vec![assets, pages, api],
            skip_waiting: true,
            clients_claim: true,
            cleanup_outdated_caches: true,
        }
    }
}

impl AgentPolicy {
    pub fn from_json(json: &str) -> Result<Self> {
        let policy: Self = serde_json::from_str(json)
            .map_err(|e| CacheError::InvalidRequest(format!("Invalid policy: {}", e)))?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            CacheError::Internal(format!("Failed to read policy {}: {}", path.display(), e))
        })?;
        let policy = Self::from_json(&json)?;
        info!(
            "Loaded policy version {} from {} ({} routes, {} precache entries)",
            policy.version,
            path.display(),
            policy.routes.len(),
            policy.precache.len()
        );
        Ok(policy)
    }

    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(CacheError::InvalidRequest("Policy version is empty".to_string()));
        }
        if self.cache_prefix.trim().is_empty() {
            return Err(CacheError::InvalidRequest("Cache prefix is empty".to_string()));
        }
        self.routes.iter().try_for_each(RouteConfig::validate)
    }

    pub fn lifecycle_options(&self, scope: &str) -> LifecycleOptions {
        LifecycleOptions {
            version: self.version.clone(),
            cache_prefix: self.cache_prefix.clone(),
            scope: scope.to_string(),
            skip_waiting: self.skip_waiting,
            clients_claim: self.clients_claim,
            cleanup_outdated_caches: self.cleanup_outdated_caches,
        }
    }

    /// Runtime stores with a bounded expiration policy.
    pub fn expirations(&self) -> Vec<(String, ExpirationPolicy)> {
        self.routes
            .iter()
            .filter_map(|route| {
                let expiration = route.expiration();
                match (&route.cache_name, expiration.is_unbounded()) {
                    (Some(name), false) => Some((name.clone(), expiration)),
                    _ => None,
                }
            })
            .collect()
    }

    // == Router Construction ==
    /// Builds the route table. Unmatched requests go network-only.
    pub fn build_router(
        &self,
        storage: &Arc<CacheStorage>,
        fetcher: &Arc<dyn NetworkFetcher>,
        stats: &SharedStats,
        site_origin: &str,
        network_timeout: Duration,
    ) -> Result<Router> {
        self.validate()?;

        let default_handler = Arc::new(NetworkOnly::new(fetcher.clone(), stats.clone()));
        let mut router = Router::new(default_handler).with_site_origin(site_origin);

        for config in &self.routes {
            let matcher = match &config.matcher {
                RouteMatch::Regex(pattern) => Matcher::regex(pattern)?,
                RouteMatch::Navigation => Matcher::Navigation,
            };

            let handler = || {
                StrategyHandler::new(
                    storage.clone(),
                    fetcher.clone(),
                    stats.clone(),
                    config.cache_name.clone().unwrap_or_default(),
                    config.filter(),
                )
                .with_expiration(config.expiration())
                .with_vary_headers(config.vary_headers.clone())
            };

            let strategy: Arc<dyn Strategy> = match config.strategy {
                StrategyKind::CacheFirst => Arc::new(CacheFirst::new(handler())),
                StrategyKind::NetworkFirst => {
                    let timeout = config
                        .network_timeout_seconds
                        .map(Duration::from_secs)
                        .unwrap_or(network_timeout);
                    Arc::new(NetworkFirst::new(handler(), timeout))
                }
                StrategyKind::StaleWhileRevalidate => {
                    Arc::new(StaleWhileRevalidate::new(handler()))
                }
                StrategyKind::NetworkOnly => {
                    Arc::new(NetworkOnly::new(fetcher.clone(), stats.clone()))
                }
            };

            router.register(Route::new(matcher, strategy));
        }

        Ok(router)
    }
}
