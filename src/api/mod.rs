//! API Module
//!
//! HTTP surface of the agent: management endpoints under `/__agent` and a
//! fallback that proxies every other request through the caches.

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
