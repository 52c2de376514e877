//! Cache Statistics Module
//!
//! Tracks agent metrics: cache hits and misses, network traffic, evictions
//! and degraded (store-less) requests.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

/// Stats shared between strategies, the prune tasks and the API.
pub type SharedStats = Arc<RwLock<CacheStats>>;

// == Cache Stats ==
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Responses served from a store
    pub hits: u64,
    /// Store lookups that found nothing usable
    pub misses: u64,
    /// Network fetches issued
    pub network_fetches: u64,
    /// Network fetches that failed or timed out
    pub network_failures: u64,
    /// Entries removed by expiration
    pub evictions: u64,
    /// Requests answered network-only because the store failed
    pub degraded: u64,
}

impl CacheStats {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStats {
        Arc::new(RwLock::new(Self::new()))
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_network_fetch(&mut self) {
        self.network_fetches += 1;
    }

    pub fn record_network_failure(&mut self) {
        self.network_failures += 1;
    }

    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    pub fn record_degraded(&mut self) {
        self.degraded += 1;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.degraded, 0);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(CacheStats::new().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.hit_rate(), 0.75);
    }

    #[test]
    fn test_record_evictions_accumulates() {
        let mut stats = CacheStats::new();
        stats.record_evictions(3);
        stats.record_evictions(0);
        stats.record_evictions(2);
        assert_eq!(stats.evictions, 5);
    }

    #[test]
    fn test_network_counters() {
        let mut stats = CacheStats::new();
        stats.record_network_fetch();
        stats.record_network_fetch();
        stats.record_network_failure();
        stats.record_degraded();
        assert_eq!(stats.network_fetches, 2);
        assert_eq!(stats.network_failures, 1);
        assert_eq!(stats.degraded, 1);
    }
}
