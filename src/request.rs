//! Request Module
//!
//! The request shape seen by the router and the strategies.

use axum::http::Method;
use bytes::Bytes;
use reqwest::Url;

// == Request Mode ==
/// How the client issued the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Top-level page navigation
    Navigate,
    /// Same-origin subresource fetch
    #[default]
    SameOrigin,
    /// Cross-origin fetch with CORS
    Cors,
    /// Cross-origin fetch without CORS (yields opaque responses)
    NoCors,
}

// == Agent Request ==
/// An intercepted request. `url` is always absolute.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub method: Method,
    pub url: String,
    pub mode: RequestMode,
    /// Header names are stored lowercased
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl AgentRequest {
    /// Creates a GET request for a subresource.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            mode: RequestMode::SameOrigin,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Creates a GET navigation request.
    pub fn navigate(url: impl Into<String>) -> Self {
        Self {
            mode: RequestMode::Navigate,
            ..Self::get(url)
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Returns the serialized origin (`scheme://host[:port]`) of the URL.
    pub fn origin(&self) -> Option<String> {
        Url::parse(&self.url)
            .ok()
            .map(|url| url.origin().ascii_serialization())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigate_sets_mode() {
        let req = AgentRequest::navigate("https://site.test/");
        assert!(req.is_navigation());
        assert_eq!(req.method, Method::GET);
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let req = AgentRequest::get("https://site.test/a.js").with_header("Accept", "text/html");
        assert_eq!(req.header("accept"), Some("text/html"));
        assert_eq!(req.header("ACCEPT"), Some("text/html"));
        assert!(req.header("x-missing").is_none());
    }

    #[test]
    fn test_origin() {
        let req = AgentRequest::get("https://cdn.test:8443/lib/all.css?v=1");
        assert_eq!(req.origin().as_deref(), Some("https://cdn.test:8443"));
        assert!(AgentRequest::get("not a url").origin().is_none());
    }
}
