//! Offline Cache - an offline resource caching agent
//!
//! Named response stores with expiration, cache-first / network-first /
//! stale-while-revalidate strategies, URL routing and a versioned
//! precache lifecycle, fronted by an HTTP proxy.

pub mod agent;
pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod network;
pub mod policy;
pub mod request;
pub mod routing;
pub mod strategy;
pub mod tasks;

pub use agent::{AgentResponse, CacheStatus, OfflineAgent};
pub use api::{create_router, AppState};
pub use config::Config;
pub use error::{CacheError, Result};
pub use policy::AgentPolicy;
pub use tasks::spawn_expiration_task;
