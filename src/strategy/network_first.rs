//! Network-first strategy

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Revalidation, Strategy, StrategyHandler, StrategyKind, StrategyResponse};
use crate::error::{CacheError, Result};
use crate::request::AgentRequest;

/// Tries the network within a timeout, falls back to the store.
///
/// The fetch runs on its own task. When the timeout fires first the fetch
/// keeps going and still updates the store once it resolves.
pub struct NetworkFirst {
    handler: StrategyHandler,
    network_timeout: Duration,
}

impl NetworkFirst {
    pub fn new(handler: StrategyHandler, network_timeout: Duration) -> Self {
        Self {
            handler,
            network_timeout,
        }
    }
}

#[async_trait]
impl Strategy for NetworkFirst {
    fn kind(&self) -> StrategyKind {
        StrategyKind::NetworkFirst
    }

    fn store_name(&self) -> Option<&str> {
        Some(self.handler.store())
    }

    async fn handle(&self, request: &AgentRequest) -> Result<StrategyResponse> {
        let handler = self.handler.clone();
        let task_request = request.clone();
        let mut fetch: Revalidation =
            tokio::spawn(async move { handler.fetch_and_cache(&task_request).await });

        let outcome = tokio::time::timeout(self.network_timeout, &mut fetch).await;
        let mut pending = None;
        match outcome {
            Ok(Ok(Ok(response))) => return Ok(StrategyResponse::from_network(response)),
            Ok(Ok(Err(e))) => debug!("network_first fetch failed for {}: {}", request.url, e),
            Ok(Err(e)) => warn!("network_first fetch task for {} aborted: {}", request.url, e),
            Err(_) => {
                debug!(
                    "network_first timed out after {:?} for {}",
                    self.network_timeout, request.url
                );
                pending = Some(fetch);
            }
        }

        match self.handler.cache_match(request).await? {
            Some(response) => Ok(StrategyResponse::from_cache(response).with_revalidation(pending)),
            None => Err(CacheError::NoCachedResponse(request.url.clone())),
        }
    }
}
