//! Network-only pass-through

use std::sync::Arc;

use async_trait::async_trait;

use super::{Strategy, StrategyKind, StrategyResponse};
use crate::cache::SharedStats;
use crate::error::Result;
use crate::network::NetworkFetcher;
use crate::request::AgentRequest;

/// Forwards the request and never reads or writes a store.
pub struct NetworkOnly {
    fetcher: Arc<dyn NetworkFetcher>,
    stats: SharedStats,
}

impl NetworkOnly {
    pub fn new(fetcher: Arc<dyn NetworkFetcher>, stats: SharedStats) -> Self {
        Self { fetcher, stats }
    }
}

#[async_trait]
impl Strategy for NetworkOnly {
    fn kind(&self) -> StrategyKind {
        StrategyKind::NetworkOnly
    }

    fn store_name(&self) -> Option<&str> {
        None
    }

    async fn handle(&self, request: &AgentRequest) -> Result<StrategyResponse> {
        self.stats.write().await.record_network_fetch();
        match self.fetcher.fetch(request).await {
            Ok(response) => Ok(StrategyResponse::from_network(response)),
            Err(e) => {
                self.stats.write().await.record_network_failure();
                Err(e)
            }
        }
    }
}
