//! Strategy Handler
//!
//! Store and network plumbing shared by every caching strategy: freshness
//! checked lookups, fetches, filtered writes and post-write pruning.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::{
    current_timestamp_ms, CacheStorage, CacheableResponseFilter, CachedResponse,
    ExpirationPolicy, RequestKey, SharedStats,
};
use crate::error::Result;
use crate::network::NetworkFetcher;
use crate::request::AgentRequest;

/// Everything a strategy needs to serve requests for one store.
#[derive(Clone)]
pub struct StrategyHandler {
    storage: Arc<CacheStorage>,
    fetcher: Arc<dyn NetworkFetcher>,
    stats: SharedStats,
    store: String,
    filter: CacheableResponseFilter,
    expiration: ExpirationPolicy,
    vary_headers: Vec<String>,
}

impl StrategyHandler {
    pub fn new(
        storage: Arc<CacheStorage>,
        fetcher: Arc<dyn NetworkFetcher>,
        stats: SharedStats,
        store: impl Into<String>,
        filter: CacheableResponseFilter,
    ) -> Self {
        Self {
            storage,
            fetcher,
            stats,
            store: store.into(),
            filter,
            expiration: ExpirationPolicy::default(),
            vary_headers: Vec::new(),
        }
    }

    pub fn with_expiration(mut self, expiration: ExpirationPolicy) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn with_vary_headers(mut self, vary_headers: Vec<String>) -> Self {
        self.vary_headers = vary_headers;
        self
    }

    pub fn store(&self) -> &str {
        &self.store
    }

    pub fn expiration(&self) -> &ExpirationPolicy {
        &self.expiration
    }

    pub fn key_for(&self, request: &AgentRequest) -> RequestKey {
        RequestKey::for_request(request, &self.vary_headers)
    }

    // == Cache Match ==
    /// Fresh stored response for the request, if any.
    ///
    /// An entry past its max age counts as a miss and is deleted.
    pub async fn cache_match(&self, request: &AgentRequest) -> Result<Option<CachedResponse>> {
        let key = self.key_for(request);
        let found = match self.storage.get(&self.store, &key).await? {
            Some(entry) if self.expiration.is_fresh(&entry, current_timestamp_ms()) => {
                Some(entry.response)
            }
            Some(_) => {
                debug!("Ignoring expired entry {} in '{}'", key, self.store);
                self.storage.delete(&self.store, &key).await?;
                None
            }
            None => None,
        };

        let mut stats = self.stats.write().await;
        if found.is_some() {
            stats.record_hit();
        } else {
            stats.record_miss();
        }
        Ok(found)
    }

    // == Fetch ==
    pub async fn fetch(&self, request: &AgentRequest) -> Result<CachedResponse> {
        self.stats.write().await.record_network_fetch();
        match self.fetcher.fetch(request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                self.stats.write().await.record_network_failure();
                Err(e)
            }
        }
    }

    // == Cache Put ==
    /// Writes the response if the filter accepts it, then schedules a prune.
    ///
    /// Returns whether the response was stored.
    pub async fn cache_put(&self, request: &AgentRequest, response: &CachedResponse) -> Result<bool> {
        if request.method != axum::http::Method::GET {
            return Ok(false);
        }
        if !self.filter.is_cacheable(response) {
            debug!(
                "Not caching {} (status {}) in '{}'",
                request.url, response.status, self.store
            );
            return Ok(false);
        }

        self.storage
            .put(&self.store, self.key_for(request), response.clone())
            .await?;

        if !self.expiration.is_unbounded() {
            self.expiration.schedule_prune(
                self.storage.clone(),
                self.store.clone(),
                self.stats.clone(),
            );
        }
        Ok(true)
    }

    // == Fetch And Cache ==
    /// Fetches and stores the response when cacheable.
    ///
    /// A failed write does not discard a successful fetch.
    pub async fn fetch_and_cache(&self, request: &AgentRequest) -> Result<CachedResponse> {
        let response = self.fetch(request).await?;
        if let Err(e) = self.cache_put(request, &response).await {
            warn!("Failed to store {} in '{}': {}", request.url, self.store, e);
            self.stats.write().await.record_degraded();
        }
        Ok(response)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::cache::CacheStats;
    use crate::network::StaticFetcher;

    pub struct Fixture {
        pub storage: Arc<CacheStorage>,
        pub fetcher: Arc<StaticFetcher>,
        pub stats: SharedStats,
    }

    impl Fixture {
        pub fn new() -> Self {
            Self {
                storage: Arc::new(CacheStorage::in_memory()),
                fetcher: Arc::new(StaticFetcher::new()),
                stats: CacheStats::shared(),
            }
        }

        pub fn handler(&self, store: &str, filter: CacheableResponseFilter) -> StrategyHandler {
            StrategyHandler::new(
                self.storage.clone(),
                self.fetcher.clone(),
                self.stats.clone(),
                store,
                filter,
            )
        }

        pub async fn seed(&self, store: &str, url: &str, body: &str) {
            self.storage
                .put(store, RequestKey::get(url), CachedResponse::new(200, body.to_string()))
                .await
                .unwrap();
        }

        pub async fn stored_body(&self, store: &str, url: &str) -> Option<String> {
            self.storage
                .get(store, &RequestKey::get(url))
                .await
                .unwrap()
                .map(|e| String::from_utf8_lossy(&e.response.body).into_owned())
        }
    }
}
