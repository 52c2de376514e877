//! Cache Module
//!
//! Named response stores, expiration, cacheability filtering and statistics.

mod entry;
mod expiration;
mod filter;
mod key;
mod stats;
mod storage;


// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry, CachedResponse};
pub use expiration::{ExpirationPolicy, PruneReport};
pub use filter::CacheableResponseFilter;
pub use key::RequestKey;
pub use stats::{CacheStats, SharedStats};
pub use storage::CacheStorage;
