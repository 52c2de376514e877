//! Storage Backend Module
//!
//! Durable, namespaced key-value byte storage underneath the named caches.

mod disk;
mod memory;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

pub use disk::DiskBackend;
pub use memory::MemoryBackend;

/// Storage backend trait
///
/// Each namespace holds one named cache. A single `write` either fully
/// commits or leaves the previous value in place. Failures are reported as
/// `CacheError::StoreUnavailable`.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read a value, `None` if absent
    async fn read(&self, namespace: &str, key: &str) -> Result<Option<Bytes>>;

    /// Write a value, creating the namespace if needed
    async fn write(&self, namespace: &str, key: &str, value: Bytes) -> Result<()>;

    /// Remove a value, returns whether it existed
    async fn remove(&self, namespace: &str, key: &str) -> Result<bool>;

    /// List keys in a namespace (empty if the namespace does not exist)
    async fn list(&self, namespace: &str) -> Result<Vec<String>>;

    /// List all namespaces
    async fn namespaces(&self) -> Result<Vec<String>>;

    /// Remove a namespace and everything in it
    async fn drop_namespace(&self, namespace: &str) -> Result<bool>;
}
