//! Stale-while-revalidate strategy

use async_trait::async_trait;
use tracing::debug;

use super::{Revalidation, Strategy, StrategyHandler, StrategyKind, StrategyResponse};
use crate::error::{CacheError, Result};
use crate::request::AgentRequest;

/// Serves the stored response immediately and refreshes it in the
/// background. On a miss the caller waits for the network.
pub struct StaleWhileRevalidate {
    handler: StrategyHandler,
}

impl StaleWhileRevalidate {
    pub fn new(handler: StrategyHandler) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl Strategy for StaleWhileRevalidate {
    fn kind(&self) -> StrategyKind {
        StrategyKind::StaleWhileRevalidate
    }

    fn store_name(&self) -> Option<&str> {
        Some(self.handler.store())
    }

    async fn handle(&self, request: &AgentRequest) -> Result<StrategyResponse> {
        // The refresh starts before the lookup so both run concurrently
        let handler = self.handler.clone();
        let task_request = request.clone();
        let refresh: Revalidation =
            tokio::spawn(async move { handler.fetch_and_cache(&task_request).await });

        let cached = match self.handler.cache_match(request).await {
            Ok(cached) => cached,
            Err(e) => {
                refresh.abort();
                return Err(e);
            }
        };

        if let Some(response) = cached {
            debug!("stale_while_revalidate hit, refreshing {}", request.url);
            return Ok(StrategyResponse::from_cache(response).with_revalidation(Some(refresh)));
        }

        match refresh.await {
            Ok(Ok(response)) => Ok(StrategyResponse::from_network(response)),
            Ok(Err(e)) => {
                debug!("stale_while_revalidate miss and fetch failed for {}: {}", request.url, e);
                Err(CacheError::NoCachedResponse(request.url.clone()))
            }
            Err(e) => Err(CacheError::Internal(format!(
                "Fetch task for {} failed: {}",
                request.url, e
            ))),
        }
    }
}
