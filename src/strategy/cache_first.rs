//! Cache-first strategy

use async_trait::async_trait;
use tracing::debug;

use super::{Strategy, StrategyHandler, StrategyKind, StrategyResponse};
use crate::error::Result;
use crate::request::AgentRequest;

/// Serves from the store; only a miss reaches the network.
///
/// A fetch failure on a miss propagates as `NetworkError`. The fetched
/// response is returned whether or not it was cacheable.
pub struct CacheFirst {
    handler: StrategyHandler,
}

impl CacheFirst {
    pub fn new(handler: StrategyHandler) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl Strategy for CacheFirst {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CacheFirst
    }

    fn store_name(&self) -> Option<&str> {
        Some(self.handler.store())
    }

    async fn handle(&self, request: &AgentRequest) -> Result<StrategyResponse> {
        if let Some(response) = self.handler.cache_match(request).await? {
            debug!("cache_first hit: {}", request.url);
            return Ok(StrategyResponse::from_cache(response));
        }

        debug!("cache_first miss: {}", request.url);
        let response = self.handler.fetch_and_cache(request).await?;
        Ok(StrategyResponse::from_network(response))
    }
}
