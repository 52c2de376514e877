//! Expiration Policy Module
//!
//! Max-age and max-entries eviction for a named store.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{current_timestamp_ms, CacheEntry, CacheStorage, SharedStats};
use crate::error::Result;

// == Expiration Policy ==
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpirationPolicy {
    pub max_entries: Option<usize>,
    pub max_age: Option<Duration>,
}

/// Outcome of one prune pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    /// Removed for exceeding max age
    pub expired: usize,
    /// Removed to get back under max entries
    pub evicted: usize,
    /// Entries left in the store
    pub remaining: usize,
}

impl PruneReport {
    pub fn removed(&self) -> usize {
        self.expired + self.evicted
    }
}

impl ExpirationPolicy {
    pub fn new(max_entries: Option<usize>, max_age_seconds: Option<u64>) -> Self {
        Self {
            max_entries,
            max_age: max_age_seconds.map(Duration::from_secs),
        }
    }

    /// True when neither limit is set.
    pub fn is_unbounded(&self) -> bool {
        self.max_entries.is_none() && self.max_age.is_none()
    }

    /// An entry is fresh until its age strictly exceeds max age.
    pub fn is_fresh(&self, entry: &CacheEntry, now_ms: i64) -> bool {
        match self.max_age {
            // Ages beyond i64 milliseconds never expire
            Some(max_age) => {
                entry.age_ms(now_ms) <= i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX)
            }
            None => true,
        }
    }

    // == Prune ==
    pub async fn prune(&self, storage: &CacheStorage, store: &str) -> Result<PruneReport> {
        self.prune_at(storage, store, current_timestamp_ms()).await
    }

    /// Removes expired entries, then the oldest inserted ones until the store
    /// fits `max_entries`.
    pub async fn prune_at(
        &self,
        storage: &CacheStorage,
        store: &str,
        now_ms: i64,
    ) -> Result<PruneReport> {
        let mut report = PruneReport::default();
        if self.is_unbounded() {
            report.remaining = storage.len(store).await?;
            return Ok(report);
        }

        // Oldest first
        let entries = storage.entries(store).await?;
        let mut survivors = Vec::with_capacity(entries.len());

        for entry in entries {
            if self.is_fresh(&entry, now_ms) {
                survivors.push(entry);
            } else if storage.delete(store, &entry.key).await? {
                report.expired += 1;
            }
        }

        if let Some(max_entries) = self.max_entries {
            let overflow = survivors.len().saturating_sub(max_entries);
            for entry in survivors.drain(..overflow) {
                if storage.delete(store, &entry.key).await? {
                    report.evicted += 1;
                }
            }
        }

        report.remaining = survivors.len();
        if report.removed() > 0 {
            debug!(
                "Pruned '{}': {} expired, {} evicted, {} remaining",
                store, report.expired, report.evicted, report.remaining
            );
        }
        Ok(report)
    }

    // == Schedule Prune ==
    /// Runs a prune on a detached task. Failures are logged only.
    pub fn schedule_prune(
        &self,
        storage: Arc<CacheStorage>,
        store: String,
        stats: SharedStats,
    ) -> JoinHandle<()> {
        let policy = *self;
        tokio::spawn(async move {
            match policy.prune(&storage, &store).await {
                Ok(report) => {
                    if report.removed() > 0 {
                        stats.write().await.record_evictions(report.removed());
                    }
                }
                Err(e) => warn!("Pruning '{}' failed: {}", store, e),
            }
        })
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStats, CachedResponse, RequestKey};

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    async fn put(storage: &CacheStorage, name: &str, stored_at: i64) {
        storage
            .put_at(
                "assets",
                RequestKey::get(format!("https://site.test/{}", name)),
                CachedResponse::new(200, name.to_string()),
                stored_at,
            )
            .await
            .unwrap();
    }

    fn urls(keys: Vec<RequestKey>) -> Vec<String> {
        keys.into_iter().map(|k| k.url).collect()
    }

    #[tokio::test]
    async fn test_max_entries_evicts_oldest() {
        let storage = CacheStorage::in_memory();
        for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
            put(&storage, name, 1_000 + i as i64).await;
        }

        let policy = ExpirationPolicy::new(Some(2), None);
        let report = policy.prune_at(&storage, "assets", 2_000).await.unwrap();

        assert_eq!(report, PruneReport { expired: 0, evicted: 2, remaining: 2 });
        assert_eq!(
            urls(storage.list_keys("assets").await.unwrap()),
            vec!["https://site.test/c", "https://site.test/d"]
        );
    }

    #[tokio::test]
    async fn test_max_age_removes_old_entries_first() {
        let storage = CacheStorage::in_memory();
        let now = 100 * DAY_MS;
        put(&storage, "ancient", now - 40 * DAY_MS).await;
        put(&storage, "old", now - 31 * DAY_MS).await;
        put(&storage, "recent", now - DAY_MS).await;
        put(&storage, "fresh", now).await;

        let policy = ExpirationPolicy::new(Some(60), Some(30 * 24 * 60 * 60));
        let report = policy.prune_at(&storage, "assets", now).await.unwrap();

        assert_eq!(report.expired, 2);
        assert_eq!(report.evicted, 0);
        assert_eq!(
            urls(storage.list_keys("assets").await.unwrap()),
            vec!["https://site.test/recent", "https://site.test/fresh"]
        );
    }

    #[tokio::test]
    async fn test_age_then_count() {
        let storage = CacheStorage::in_memory();
        put(&storage, "expired", 0).await;
        put(&storage, "a", 9_000).await;
        put(&storage, "b", 9_500).await;
        put(&storage, "c", 9_900).await;

        let policy = ExpirationPolicy::new(Some(1), Some(5));
        let report = policy.prune_at(&storage, "assets", 10_000).await.unwrap();

        assert_eq!(report, PruneReport { expired: 1, evicted: 2, remaining: 1 });
        assert_eq!(urls(storage.list_keys("assets").await.unwrap()), vec!["https://site.test/c"]);
    }

    #[tokio::test]
    async fn test_unbounded_policy_keeps_everything() {
        let storage = CacheStorage::in_memory();
        put(&storage, "a", 0).await;

        let report = ExpirationPolicy::default()
            .prune_at(&storage, "assets", i64::MAX / 2)
            .await
            .unwrap();
        assert_eq!(report, PruneReport { expired: 0, evicted: 0, remaining: 1 });
    }

    #[tokio::test]
    async fn test_freshness_boundary() {
        let policy = ExpirationPolicy::new(None, Some(1));
        let entry = CacheEntry {
            key: RequestKey::get("https://site.test/x"),
            stored_at: 0,
            seq: 0,
            response: CachedResponse::new(200, ""),
        };
        assert!(policy.is_fresh(&entry, 1_000));
        assert!(!policy.is_fresh(&entry, 1_001));
    }

    #[tokio::test]
    async fn test_huge_max_age_never_expires() {
        let policy = ExpirationPolicy::new(None, Some(10_000_000_000_000_000));
        let entry = CacheEntry {
            key: RequestKey::get("https://site.test/x"),
            stored_at: 0,
            seq: 0,
            response: CachedResponse::new(200, ""),
        };
        assert!(policy.is_fresh(&entry, 1));

        let storage = CacheStorage::in_memory();
        put(&storage, "kept", 0).await;
        let report = policy.prune_at(&storage, "assets", 1).await.unwrap();
        assert_eq!(report, PruneReport { expired: 0, evicted: 0, remaining: 1 });
    }

    #[tokio::test]
    async fn test_scheduled_prune_records_evictions() {
        let storage = Arc::new(CacheStorage::in_memory());
        for i in 0..5 {
            put(&storage, &format!("f{}", i), 1_000 + i).await;
        }
        let stats = CacheStats::shared();

        ExpirationPolicy::new(Some(3), None)
            .schedule_prune(storage.clone(), "assets".to_string(), stats.clone())
            .await
            .unwrap();

        assert_eq!(storage.len("assets").await.unwrap(), 3);
        assert_eq!(stats.read().await.evictions, 2);
    }
}
