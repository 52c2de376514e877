//! Offline Agent
//!
//! Single entry point for intercepted requests. Precached URLs are served
//! from the precache store, everything else goes through the route table.
//! Store failures degrade the agent to network-only instead of failing.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, CacheStorage, CachedResponse, ExpirationPolicy, RequestKey, SharedStats};
use crate::error::{CacheError, Result};
use crate::lifecycle::{
    ClientInfo, ClientRegistry, LifecycleController, LifecycleState, PrecacheManifest,
};
use crate::network::NetworkFetcher;
use crate::policy::AgentPolicy;
use crate::request::AgentRequest;
use crate::routing::Router;
use crate::strategy::{NetworkOnly, ResponseSource, Revalidation, Strategy, StrategyResponse};

/// How a response relates to the caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Served from a store
    Hit,
    /// Fetched through a store-backed strategy
    Miss,
    /// No store involved
    Bypass,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::Bypass => "bypass",
        }
    }
}

#[derive(Debug)]
pub struct AgentResponse {
    pub response: CachedResponse,
    pub source: ResponseSource,
    pub cache_status: CacheStatus,
    /// Background refresh still running, if any
    pub revalidation: Option<Revalidation>,
}

impl AgentResponse {
    fn bypass(strategy_response: StrategyResponse) -> Self {
        Self {
            response: strategy_response.response,
            source: ResponseSource::Network,
            cache_status: CacheStatus::Bypass,
            revalidation: None,
        }
    }

    fn from_strategy(strategy_response: StrategyResponse, store_backed: bool) -> Self {
        let cache_status = match (strategy_response.source, store_backed) {
            (ResponseSource::Cache, _) => CacheStatus::Hit,
            (ResponseSource::Network, true) => CacheStatus::Miss,
            (ResponseSource::Network, false) => CacheStatus::Bypass,
        };
        Self {
            response: strategy_response.response,
            source: strategy_response.source,
            cache_status,
            revalidation: strategy_response.revalidation,
        }
    }
}

// == Offline Agent ==
pub struct OfflineAgent {
    storage: Arc<CacheStorage>,
    stats: SharedStats,
    router: Router,
    lifecycle: LifecycleController,
    network_only: NetworkOnly,
    expirations: Vec<(String, ExpirationPolicy)>,
    client_idle_timeout: Duration,
}

/// Clients not seen for this long are released by the sweep.
pub const DEFAULT_CLIENT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

impl OfflineAgent {
    /// Builds the agent for one deployment of `policy`.
    ///
    /// `site_origin` is the origin the agent serves (for example
    /// `https://site.test`); the precache scope is that origin with a
    /// trailing slash.
    pub fn new(
        policy: &AgentPolicy,
        storage: Arc<CacheStorage>,
        fetcher: Arc<dyn NetworkFetcher>,
        clients: Arc<ClientRegistry>,
        site_origin: &str,
        network_timeout: Duration,
    ) -> Result<Self> {
        let site_origin = site_origin.trim_end_matches('/');
        let scope = format!("{}/", site_origin);
        let stats = CacheStats::shared();

        let router =
            policy.build_router(&storage, &fetcher, &stats, site_origin, network_timeout)?;
        let manifest = PrecacheManifest::new(&policy.precache, &scope)?;
        let lifecycle = LifecycleController::new(
            storage.clone(),
            fetcher.clone(),
            manifest,
            policy.lifecycle_options(&scope),
            clients,
        );

        Ok(Self {
            network_only: NetworkOnly::new(fetcher, stats.clone()),
            storage,
            stats,
            router,
            lifecycle,
            expirations: policy.expirations(),
            client_idle_timeout: DEFAULT_CLIENT_IDLE_TIMEOUT,
        })
    }

    pub fn with_client_idle_timeout(mut self, timeout: Duration) -> Self {
        self.client_idle_timeout = timeout;
        self
    }

    /// Installs the deployment and activates it when allowed.
    pub async fn start(&self) -> Result<LifecycleState> {
        self.lifecycle.start().await
    }

    pub fn lifecycle(&self) -> &LifecycleController {
        &self.lifecycle
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }

    // == Request Handling ==
    pub async fn handle(&self, request: &AgentRequest) -> Result<AgentResponse> {
        if self.lifecycle.state().await != LifecycleState::Active {
            debug!("Not active yet, bypassing caches for {}", request.url);
            return self.network_only.handle(request).await.map(AgentResponse::bypass);
        }

        let outcome = match self.handle_precached(request).await {
            Ok(Some(response)) => return Ok(response),
            Ok(None) => self.handle_routed(request).await,
            Err(e) => Err(e),
        };

        match outcome {
            Err(e) if e.is_store_failure() => {
                warn!("Store unavailable for {}, serving from network: {}", request.url, e);
                self.stats.write().await.record_degraded();
                self.network_only.handle(request).await.map(AgentResponse::bypass)
            }
            other => other,
        }
    }

    /// Cache-first against the precache store for manifest URLs.
    async fn handle_precached(&self, request: &AgentRequest) -> Result<Option<AgentResponse>> {
        if request.method != axum::http::Method::GET
            || !self.lifecycle.is_precached_url(&request.url)
        {
            return Ok(None);
        }

        if let Some(response) = self.lifecycle.match_precache(&request.url).await? {
            self.stats.write().await.record_hit();
            debug!("Precache hit for {}", request.url);
            return Ok(Some(AgentResponse::from_strategy(
                StrategyResponse::from_cache(response),
                true,
            )));
        }

        self.stats.write().await.record_miss();
        let response = self.network_only.handle(request).await?;
        match self
            .lifecycle
            .store_precache(&request.url, response.response.clone())
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_store_failure() => {
                warn!("Could not restore precache entry for {}: {}", request.url, e);
                self.stats.write().await.record_degraded();
            }
            Err(e) => return Err(e),
        }
        Ok(Some(AgentResponse::from_strategy(response, true)))
    }

    async fn handle_routed(&self, request: &AgentRequest) -> Result<AgentResponse> {
        let strategy = self.router.strategy_for(request);
        let store_backed = strategy.store_name().is_some();
        debug!("Routing {} {} via {}", request.method, request.url, strategy.kind());
        let response = strategy.handle(request).await?;
        Ok(AgentResponse::from_strategy(response, store_backed))
    }

    // == Clients ==
    pub async fn connect_client(&self, id: &str) -> ClientInfo {
        self.lifecycle.connect_client(id).await
    }

    pub async fn disconnect_client(&self, id: &str) -> Result<bool> {
        self.lifecycle.disconnect_client(id).await
    }

    /// Releases clients idle past the configured timeout.
    pub async fn expire_idle_clients(&self) -> Result<usize> {
        self.lifecycle
            .disconnect_idle_clients(self.client_idle_timeout)
            .await
    }

    // == Store Management ==
    pub async fn store_names(&self) -> Result<Vec<String>> {
        let mut names = self.storage.store_names().await?;
        names.sort();
        Ok(names)
    }

    pub async fn list_keys(&self, store: &str) -> Result<Vec<RequestKey>> {
        if !self.storage.has_store(store).await? {
            return Err(CacheError::InvalidRequest(format!("Unknown store: {}", store)));
        }
        self.storage.list_keys(store).await
    }

    pub async fn delete_store(&self, store: &str) -> Result<bool> {
        let deleted = self.storage.delete_store(store).await?;
        if deleted {
            info!("Deleted store '{}'", store);
        }
        Ok(deleted)
    }

    /// Prunes every runtime store that has an expiration policy.
    /// Returns the number of entries removed.
    pub async fn prune_all(&self) -> Result<usize> {
        let mut removed = 0;
        for (store, policy) in &self.expirations {
            removed += policy.prune(&self.storage, store).await?.removed();
        }
        if removed > 0 {
            self.stats.write().await.record_evictions(removed);
        }
        Ok(removed)
    }
}
