//! In-memory storage backend

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use super::StorageBackend;
use crate::error::Result;

/// Volatile backend, used for tests and when no cache directory is configured.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    namespaces: RwLock<HashMap<String, HashMap<String, Bytes>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn read(&self, namespace: &str, key: &str) -> Result<Option<Bytes>> {
        let guard = self.namespaces.read().await;
        Ok(guard.get(namespace).and_then(|ns| ns.get(key)).cloned())
    }

    async fn write(&self, namespace: &str, key: &str, value: Bytes) -> Result<()> {
        let mut guard = self.namespaces.write().await;
        guard
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, namespace: &str, key: &str) -> Result<bool> {
        let mut guard = self.namespaces.write().await;
        Ok(guard
            .get_mut(namespace)
            .map(|ns| ns.remove(key).is_some())
            .unwrap_or(false))
    }

    async fn list(&self, namespace: &str) -> Result<Vec<String>> {
        let guard = self.namespaces.read().await;
        Ok(guard
            .get(namespace)
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn namespaces(&self) -> Result<Vec<String>> {
        let guard = self.namespaces.read().await;
        let mut names: Vec<String> = guard.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn drop_namespace(&self, namespace: &str) -> Result<bool> {
        let mut guard = self.namespaces.write().await;
        Ok(guard.remove(namespace).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_remove() {
        let backend = MemoryBackend::new();

        backend.write("ns", "k", Bytes::from_static(b"v")).await.unwrap();
        assert_eq!(backend.read("ns", "k").await.unwrap(), Some(Bytes::from_static(b"v")));

        assert!(backend.remove("ns", "k").await.unwrap());
        assert!(!backend.remove("ns", "k").await.unwrap());
        assert!(backend.read("ns", "k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_namespace_is_empty() {
        let backend = MemoryBackend::new();
        assert!(backend.list("nope").await.unwrap().is_empty());
        assert!(backend.read("nope", "k").await.unwrap().is_none());
        assert!(!backend.drop_namespace("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_namespaces_sorted() {
        let backend = MemoryBackend::new();
        backend.write("b", "k", Bytes::new()).await.unwrap();
        backend.write("a", "k", Bytes::new()).await.unwrap();
        assert_eq!(backend.namespaces().await.unwrap(), vec!["a", "b"]);

        assert!(backend.drop_namespace("a").await.unwrap());
        assert_eq!(backend.namespaces().await.unwrap(), vec!["b"]);
    }
}
