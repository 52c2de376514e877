//! Response DTOs for the management API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::agent::{AgentResponse, CacheStatus};
use crate::cache::{CacheStats, RequestKey};
use crate::lifecycle::{ActivationReport, ClientInfo, LifecycleState};
use crate::strategy::ResponseSource;

/// Response body for `GET /__agent/stats`
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: CacheStats,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            stats,
        }
    }
}

/// Response body for `GET /__agent/health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy" once active, "starting" before
    pub status: String,
    pub version: String,
    pub state: LifecycleState,
    /// Current timestamp in RFC 3339 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn new(version: impl Into<String>, state: LifecycleState) -> Self {
        let status = match state {
            LifecycleState::Active => "healthy",
            LifecycleState::Redundant => "failed",
            _ => "starting",
        };
        Self {
            status: status.to_string(),
            version: version.into(),
            state,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Response body for `GET /__agent/lifecycle`
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleResponse {
    pub version: String,
    pub state: LifecycleState,
    pub precache_store: String,
    pub precache_entries: usize,
    pub clients: Vec<ClientInfo>,
    /// Outcome of activation, null until active
    pub activation: Option<ActivationReport>,
}

/// Response body for `GET /__agent/stores`
#[derive(Debug, Clone, Serialize)]
pub struct StoresResponse {
    pub stores: Vec<String>,
}

/// Response body for `GET /__agent/stores/:name`
#[derive(Debug, Clone, Serialize)]
pub struct StoreKeysResponse {
    pub store: String,
    pub count: usize,
    /// Keys in insertion order, canonical form
    pub keys: Vec<String>,
}

impl StoreKeysResponse {
    pub fn new(store: impl Into<String>, keys: Vec<RequestKey>) -> Self {
        let keys: Vec<String> = keys.iter().map(ToString::to_string).collect();
        Self {
            store: store.into(),
            count: keys.len(),
            keys,
        }
    }
}

/// Response body for `DELETE /__agent/stores/:name`
#[derive(Debug, Clone, Serialize)]
pub struct DeleteStoreResponse {
    pub message: String,
    pub store: String,
}

impl DeleteStoreResponse {
    pub fn new(store: impl Into<String>) -> Self {
        let store = store.into();
        Self {
            message: format!("Store '{}' deleted successfully", store),
            store,
        }
    }
}

/// Response body for `DELETE /__agent/clients/:id`
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseClientResponse {
    pub message: String,
    pub client: String,
    pub state: LifecycleState,
}

impl ReleaseClientResponse {
    pub fn new(client: impl Into<String>, state: LifecycleState) -> Self {
        let client = client.into();
        Self {
            message: format!("Client '{}' released", client),
            client,
            state,
        }
    }
}

/// Response body for `GET /__agent/fetch`
#[derive(Debug, Clone, Serialize)]
pub struct FetchResponse {
    pub url: String,
    pub status: u16,
    pub source: ResponseSource,
    pub cache_status: CacheStatus,
    pub headers: BTreeMap<String, String>,
    /// Body decoded as UTF-8, lossy
    pub body: String,
    pub body_bytes: usize,
}

impl FetchResponse {
    pub fn new(url: impl Into<String>, agent_response: &AgentResponse) -> Self {
        let response = &agent_response.response;
        Self {
            url: url.into(),
            status: response.status,
            source: agent_response.source,
            cache_status: agent_response.cache_status,
            headers: response.headers.iter().cloned().collect(),
            body: String::from_utf8_lossy(&response.body).into_owned(),
            body_bytes: response.body.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_response_flattens_counters() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_degraded();

        let json = serde_json::to_value(StatsResponse::from(stats)).unwrap();
        assert_eq!(json["hits"], 2);
        assert_eq!(json["degraded"], 1);
        assert!((json["hit_rate"].as_f64().unwrap() - 2.0 / 3.0).abs() < 0.001);
    }

    #[test]
    fn test_health_response_status() {
        assert_eq!(HealthResponse::new("1", LifecycleState::Active).status, "healthy");
        assert_eq!(HealthResponse::new("1", LifecycleState::Waiting).status, "starting");
        let json = serde_json::to_string(&HealthResponse::new("1", LifecycleState::Redundant)).unwrap();
        assert!(json.contains("\"state\":\"redundant\""));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_store_keys_response() {
        let resp = StoreKeysResponse::new(
            "assets",
            vec![RequestKey::get("https://site.test/a.js")],
        );
        assert_eq!(resp.count, 1);
        assert_eq!(resp.keys, vec!["GET https://site.test/a.js"]);
    }

    #[test]
    fn test_lifecycle_response_reports_cleanup_error() {
        let resp = LifecycleResponse {
            version: "2".to_string(),
            state: LifecycleState::Active,
            precache_store: "p".to_string(),
            precache_entries: 0,
            clients: Vec::new(),
            activation: Some(ActivationReport {
                cleanup_error: Some("Store unavailable: disk gone".to_string()),
                ..ActivationReport::default()
            }),
        };
        let json = serde_json::to_value(resp).unwrap();
        assert_eq!(json["activation"]["cleanup_error"], "Store unavailable: disk gone");
        assert_eq!(json["activation"]["deleted_stores"], serde_json::json!([]));
    }

    #[test]
    fn test_delete_store_response() {
        let resp = DeleteStoreResponse::new("assets");
        assert!(resp.message.contains("assets"));
    }
}
