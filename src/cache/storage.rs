//! Cache Storage Module
//!
//! Named, isolated response stores on top of a [`StorageBackend`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{MemoryBackend, StorageBackend};
use crate::cache::{current_timestamp_ms, CacheEntry, CachedResponse, RequestKey};
use crate::error::{CacheError, Result};

// == Cache Storage ==
/// Entry point for every named store.
///
/// Stores are created lazily by the first `put` and only disappear through
/// [`CacheStorage::delete_store`].
pub struct CacheStorage {
    backend: Arc<dyn StorageBackend>,
    seq: AtomicU64,
}

impl CacheStorage {
    // == Constructor ==
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            seq: AtomicU64::new(0),
        }
    }

    /// Creates storage backed by memory only.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    // == Get ==
    /// Looks up an entry. A missing store or key is `Ok(None)`.
    pub async fn get(&self, store: &str, key: &RequestKey) -> Result<Option<CacheEntry>> {
        match self.backend.read(store, &key.to_string()).await? {
            Some(data) => CacheEntry::decode(data).map(Some),
            None => Ok(None),
        }
    }

    // == Put ==
    /// Stores a response under `key`, replacing any previous entry.
    pub async fn put(
        &self,
        store: &str,
        key: RequestKey,
        response: CachedResponse,
    ) -> Result<CacheEntry> {
        self.put_at(store, key, response, current_timestamp_ms()).await
    }

    /// Stores a response with an explicit `stored_at` timestamp.
    pub async fn put_at(
        &self,
        store: &str,
        key: RequestKey,
        response: CachedResponse,
        stored_at: i64,
    ) -> Result<CacheEntry> {
        if key.method != "GET" {
            return Err(CacheError::InvalidRequest(format!(
                "Only GET requests can be cached, got {}",
                key.method
            )));
        }

        let entry = CacheEntry {
            key,
            stored_at,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            response,
        };
        self.backend
            .write(store, &entry.key.to_string(), entry.encode()?)
            .await?;

        debug!("Stored {} in '{}'", entry.key, store);
        Ok(entry)
    }

    // == Delete ==
    /// Removes an entry. Returns false if it was not present.
    pub async fn delete(&self, store: &str, key: &RequestKey) -> Result<bool> {
        self.backend.remove(store, &key.to_string()).await
    }

    // == Entries ==
    /// All entries of a store, oldest insertion first.
    ///
    /// Records that fail to decode are skipped and removed.
    pub async fn entries(&self, store: &str) -> Result<Vec<CacheEntry>> {
        let mut entries = Vec::new();

        for raw_key in self.backend.list(store).await? {
            let Some(data) = self.backend.read(store, &raw_key).await? else {
                continue;
            };
            match CacheEntry::decode(data) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!("Dropping unreadable entry '{}' in '{}': {}", raw_key, store, e);
                    self.backend.remove(store, &raw_key).await?;
                }
            }
        }

        entries.sort_by_key(|e| (e.stored_at, e.seq));
        Ok(entries)
    }

    // == List Keys ==
    /// Keys of a store, oldest insertion first.
    pub async fn list_keys(&self, store: &str) -> Result<Vec<RequestKey>> {
        Ok(self
            .entries(store)
            .await?
            .into_iter()
            .map(|e| e.key)
            .collect())
    }

    pub async fn len(&self, store: &str) -> Result<usize> {
        Ok(self.backend.list(store).await?.len())
    }

    // == Store Management ==
    pub async fn store_names(&self) -> Result<Vec<String>> {
        self.backend.namespaces().await
    }

    pub async fn has_store(&self, store: &str) -> Result<bool> {
        Ok(self.store_names().await?.iter().any(|s| s == store))
    }

    pub async fn delete_store(&self, store: &str) -> Result<bool> {
        let deleted = self.backend.drop_namespace(store).await?;
        if deleted {
            debug!("Deleted store '{}'", store);
        }
        Ok(deleted)
    }
}
