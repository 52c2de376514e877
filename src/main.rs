//! Offline Cache - an offline resource caching agent
//!
//! Fronts a site with named caches, routing strategies and a versioned
//! precache, so pages keep working when the upstream is unreachable.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use offline_cache::backend::{DiskBackend, MemoryBackend, StorageBackend};
use offline_cache::cache::CacheStorage;
use offline_cache::lifecycle::ClientRegistry;
use offline_cache::network::HttpFetcher;
use offline_cache::{create_router, spawn_expiration_task, AgentPolicy, AppState, Config, OfflineAgent};

/// Main entry point for the caching agent.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration and caching policy
/// 3. Open the storage backend
/// 4. Install and activate the deployment
/// 5. Start the expiration sweep
/// 6. Serve HTTP until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "offline_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting offline caching agent");

    let config = Config::from_env();
    info!(
        "Configuration loaded: upstream={}, port={}, network_timeout={}s, sweep_interval={}s",
        config.upstream_origin,
        config.server_port,
        config.network_timeout_secs,
        config.sweep_interval_secs
    );

    let policy = match &config.policy_file {
        Some(path) => AgentPolicy::from_file(path)
            .with_context(|| format!("loading policy from {}", path.display()))?,
        None => {
            info!("No POLICY_FILE set, using built-in site policy");
            AgentPolicy::default()
        }
    };

    let backend: Arc<dyn StorageBackend> = match &config.cache_dir {
        Some(dir) => Arc::new(
            DiskBackend::new(dir)
                .await
                .with_context(|| format!("opening cache directory {}", dir.display()))?,
        ),
        None => {
            warn!("No CACHE_DIR set, caches will not survive a restart");
            Arc::new(MemoryBackend::new())
        }
    };
    let storage = Arc::new(CacheStorage::new(backend));
    let fetcher = Arc::new(HttpFetcher::new(config.network_timeout()).context("building HTTP client")?);

    let agent = Arc::new(
        OfflineAgent::new(
            &policy,
            storage,
            fetcher,
            Arc::new(ClientRegistry::new()),
            &config.upstream_origin,
            config.network_timeout(),
        )
        .context("building agent")?
        .with_client_idle_timeout(config.client_idle_timeout()),
    );

    // A failed install leaves the agent network-only rather than down
    match agent.start().await {
        Ok(state) => info!("Deployment {} is {:?}", policy.version, state),
        Err(e) => error!("Deployment {} failed to install: {}", policy.version, e),
    }

    let sweep_handle = spawn_expiration_task(agent.clone(), config.sweep_interval_secs);
    info!("Background expiration sweep started");

    let app = create_router(AppState::new(agent, config.upstream_origin.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(sweep_handle))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then stops the sweep.
async fn shutdown_signal(sweep_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    sweep_handle.abort();
    warn!("Expiration sweep aborted");
}
