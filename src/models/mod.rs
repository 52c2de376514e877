//! Request and Response models for the agent's management API
//!
//! DTOs serialized to and from the `/__agent` endpoints.

pub mod requests;
pub mod responses;

pub use requests::FetchQuery;
pub use responses::{
    DeleteStoreResponse, FetchResponse, HealthResponse, LifecycleResponse, ReleaseClientResponse,
    StatsResponse, StoreKeysResponse, StoresResponse,
};
