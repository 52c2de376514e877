//! Expiration Sweep Task
//!
//! Puts are followed by an opportunistic prune of the written store; this
//! sweep also catches stores that stopped receiving writes. Idle clients
//! are released on the same tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::agent::OfflineAgent;

/// Spawns a background task that prunes the agent's stores and releases
/// idle clients every `sweep_interval_secs` seconds.
///
/// Returns the task handle so it can be aborted during graceful shutdown.
pub fn spawn_expiration_task(agent: Arc<OfflineAgent>, sweep_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(sweep_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting expiration sweep with interval of {} seconds",
            interval.as_secs()
        );

        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match agent.prune_all().await {
                Ok(0) => debug!("Expiration sweep: nothing to remove"),
                Ok(removed) => info!("Expiration sweep: removed {} entries", removed),
                Err(e) => warn!("Expiration sweep failed: {}", e),
            }

            match agent.expire_idle_clients().await {
                Ok(0) => {}
                Ok(released) => info!("Expiration sweep: released {} idle clients", released),
                Err(e) => warn!("Releasing idle clients failed: {}", e),
            }
        }
    })
}
