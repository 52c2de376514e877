//! Network Module
//!
//! The fetch collaborator used by strategies and precaching.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::cache::CachedResponse;
use crate::error::{CacheError, Result};
use crate::request::AgentRequest;

/// Request headers that must not be forwarded upstream.
const HOP_BY_HOP: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
    "content-length",
];

/// Fetches a request from the network.
///
/// Any failure to obtain a response (connectivity, DNS, timeout) is a
/// `CacheError::NetworkError`. HTTP error statuses are successful fetches.
#[async_trait]
pub trait NetworkFetcher: Send + Sync {
    async fn fetch(&self, request: &AgentRequest) -> Result<CachedResponse>;
}

// == HTTP Fetcher ==
/// reqwest-based fetcher used by the host process.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// `timeout` bounds each individual fetch end to end.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| CacheError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl NetworkFetcher for HttpFetcher {
    async fn fetch(&self, request: &AgentRequest) -> Result<CachedResponse> {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            if HOP_BY_HOP.contains(&name.as_str()) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CacheError::NetworkError(format!("{}: {}", request.url, e)))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| CacheError::NetworkError(format!("{}: {}", request.url, e)))?;

        debug!("Fetched {} -> {}", request.url, status);
        Ok(CachedResponse {
            status,
            headers,
            body,
        })
    }
}

// == Static Fetcher ==
/// In-memory fetcher with scripted responses.
///
/// Unknown URLs answer 404. While offline every fetch fails with
/// `NetworkError`. Used for tests and offline simulations.
#[derive(Default)]
pub struct StaticFetcher {
    responses: Mutex<HashMap<String, CachedResponse>>,
    calls: Mutex<HashMap<String, usize>>,
    latency: Mutex<Option<Duration>>,
    offline: AtomicBool,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the response returned for `url`.
    pub fn respond(&self, url: impl Into<String>, response: CachedResponse) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(url.into(), response);
        }
    }

    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    /// Delay applied to every fetch before it resolves.
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut guard) = self.latency.lock() {
            *guard = latency;
        }
    }

    /// Number of fetches issued for `url`, including failed ones.
    pub fn calls(&self, url: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(url).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.values().sum())
            .unwrap_or(0)
    }
}

#[async_trait]
impl NetworkFetcher for StaticFetcher {
    async fn fetch(&self, request: &AgentRequest) -> Result<CachedResponse> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(request.url.clone()).or_insert(0) += 1;
        }

        let latency = self.latency.lock().ok().and_then(|guard| *guard);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::NetworkError(format!(
                "{}: network unreachable",
                request.url
            )));
        }

        let response = self
            .responses
            .lock()
            .map_err(|_| CacheError::Internal("Fetcher state poisoned".to_string()))?
            .get(&request.url)
            .cloned();
        Ok(response.unwrap_or_else(|| CachedResponse::new(404, "Not Found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_fetcher_serves_scripted_response() {
        let fetcher = StaticFetcher::new();
        fetcher.respond("https://site.test/a.js", CachedResponse::new(200, "js"));

        let response = fetcher.fetch(&AgentRequest::get("https://site.test/a.js")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "js");
        assert_eq!(fetcher.calls("https://site.test/a.js"), 1);
    }

    #[tokio::test]
    async fn test_static_fetcher_unknown_url_is_404() {
        let fetcher = StaticFetcher::new();
        let response = fetcher.fetch(&AgentRequest::get("https://site.test/nope")).await.unwrap();
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_static_fetcher_offline() {
        let fetcher = StaticFetcher::new();
        fetcher.respond("https://site.test/a.js", CachedResponse::new(200, "js"));
        fetcher.set_online(false);

        let result = fetcher.fetch(&AgentRequest::get("https://site.test/a.js")).await;
        assert!(matches!(result, Err(CacheError::NetworkError(_))));
        assert_eq!(fetcher.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_http_fetcher_unreachable_host_is_network_error() {
        let fetcher = HttpFetcher::new(Duration::from_secs(2)).unwrap();
        let result = fetcher
            .fetch(&AgentRequest::get("http://127.0.0.1:1/unreachable"))
            .await;
        assert!(matches!(result, Err(CacheError::NetworkError(_))));
    }
}
