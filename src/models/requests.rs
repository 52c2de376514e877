//! Request DTOs for the management API
//!
//! Defines the query strings accepted by the `/__agent` endpoints.

use serde::Deserialize;

use crate::request::{AgentRequest, RequestMode};

/// Query for `GET /__agent/fetch`
///
/// Runs an absolute URL through the agent as if it had been intercepted.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchQuery {
    /// Absolute URL to request
    pub url: String,
    /// Treat the request as a navigation
    #[serde(default)]
    pub navigate: bool,
}

impl FetchQuery {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        match reqwest::Url::parse(&self.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => None,
            Ok(url) => Some(format!("Unsupported scheme '{}'", url.scheme())),
            Err(e) => Some(format!("Invalid URL '{}': {}", self.url, e)),
        }
    }

    pub fn to_request(&self) -> AgentRequest {
        let request = AgentRequest::get(self.url.clone());
        if self.navigate {
            request.with_mode(RequestMode::Navigate)
        } else {
            request
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_query_deserialize() {
        let query: FetchQuery = serde_json::from_str(r#"{"url": "https://site.test/a.js"}"#).unwrap();
        assert_eq!(query.url, "https://site.test/a.js");
        assert!(!query.navigate);
        assert!(!query.to_request().is_navigation());
    }

    #[test]
    fn test_navigate_flag() {
        let query = FetchQuery {
            url: "https://site.test/".to_string(),
            navigate: true,
        };
        assert!(query.to_request().is_navigation());
    }

    #[test]
    fn test_validate() {
        let query = |url: &str| FetchQuery {
            url: url.to_string(),
            navigate: false,
        };
        assert!(query("https://site.test/x").validate().is_none());
        assert!(query("/relative").validate().is_some());
        assert!(query("ftp://site.test/x").validate().is_some());
    }
}
