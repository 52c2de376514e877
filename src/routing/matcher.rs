//! Route matchers
//!
//! Pure predicates over request metadata.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::error::{CacheError, Result};
use crate::request::AgentRequest;

/// Custom predicate over a request.
pub type RequestPredicate = Arc<dyn Fn(&AgentRequest) -> bool + Send + Sync>;

/// Decides whether a route applies to a request.
#[derive(Clone)]
pub enum Matcher {
    /// Pattern tested against the full URL
    Regex(Regex),
    /// Top-level navigations
    Navigation,
    /// Arbitrary predicate
    Predicate(RequestPredicate),
}

impl Matcher {
    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Matcher::Regex)
            .map_err(|e| CacheError::InvalidRequest(format!("Invalid route pattern '{}': {}", pattern, e)))
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&AgentRequest) -> bool + Send + Sync + 'static,
    {
        Matcher::Predicate(Arc::new(f))
    }

    /// Tests the request.
    ///
    /// For a cross-origin URL a regex only matches when the match starts at
    /// the beginning of the URL, so `\.js$` style patterns stay same-origin.
    pub fn matches(&self, request: &AgentRequest, site_origin: Option<&str>) -> bool {
        match self {
            Matcher::Regex(regex) => {
                let Some(found) = regex.find(&request.url) else {
                    return false;
                };
                let same_origin = match (site_origin, request.origin()) {
                    (Some(site), Some(origin)) => site == origin,
                    (None, _) => true,
                    (Some(_), None) => false,
                };
                same_origin || found.start() == 0
            }
            Matcher::Navigation => request.is_navigation(),
            Matcher::Predicate(predicate) => predicate(request),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Regex(regex) => write!(f, "Regex({})", regex.as_str()),
            Matcher::Navigation => f.write_str("Navigation"),
            Matcher::Predicate(_) => f.write_str("Predicate"),
        }
    }
}
