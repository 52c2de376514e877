//! API Routes
//!
//! Configures the Axum router: management endpoints plus the proxy fallback.

use axum::{
    routing::{delete, get},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    delete_store_handler, fetch_handler, health_handler, lifecycle_handler, list_stores_handler,
    proxy_handler, release_client_handler, stats_handler, store_keys_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /__agent/health` - Health and lifecycle state
/// - `GET /__agent/stats` - Cache statistics
/// - `GET /__agent/lifecycle` - Version, state, clients and activation report
/// - `DELETE /__agent/clients/:id` - Release a client
/// - `GET /__agent/stores` - Store names
/// - `GET /__agent/stores/:name` - Keys in a store
/// - `DELETE /__agent/stores/:name` - Drop a store
/// - `GET /__agent/fetch?url=` - Run an absolute URL through the agent
/// - anything else - proxied through the agent
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/__agent/health", get(health_handler))
        .route("/__agent/stats", get(stats_handler))
        .route("/__agent/lifecycle", get(lifecycle_handler))
        .route("/__agent/clients/:id", delete(release_client_handler))
        .route("/__agent/stores", get(list_stores_handler))
        .route(
            "/__agent/stores/:name",
            get(store_keys_handler).delete(delete_store_handler),
        )
        .route("/__agent/fetch", get(fetch_handler))
        .fallback(proxy_handler)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
