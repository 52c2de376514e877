//! Request Key Module
//!
//! Identity of a cached request: method, URL and the values of any
//! vary headers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::request::AgentRequest;

// == Request Key ==
/// Uniquely identifies at most one entry per store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    /// Uppercase HTTP method
    pub method: String,
    /// Absolute URL
    pub url: String,
    /// Lowercased header name and request value, sorted by name
    #[serde(default)]
    pub vary: Vec<(String, String)>,
}

impl RequestKey {
    /// Creates a key for a GET request without vary headers.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            vary: Vec::new(),
        }
    }

    /// Builds the key for a request, capturing the named vary headers.
    ///
    /// A vary header absent from the request contributes an empty value, so
    /// "header missing" is its own identity.
    pub fn for_request(request: &AgentRequest, vary_headers: &[String]) -> Self {
        let mut vary: Vec<(String, String)> = vary_headers
            .iter()
            .map(|name| {
                let name = name.to_ascii_lowercase();
                let value = request.header(&name).unwrap_or_default().to_string();
                (name, value)
            })
            .collect();
        vary.sort();
        vary.dedup_by(|a, b| a.0 == b.0);

        Self {
            method: request.method.as_str().to_ascii_uppercase(),
            url: request.url.clone(),
            vary,
        }
    }
}

// == Canonical Form ==
/// `METHOD url` followed by `\tname=value` for each vary header.
impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)?;
        for (name, value) in &self.vary {
            write!(f, "\t{}={}", name, value)?;
        }
        Ok(())
    }
}

impl FromStr for RequestKey {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('\t');
        let head = parts.next().unwrap_or_default();
        let (method, url) = head
            .split_once(' ')
            .ok_or_else(|| CacheError::InvalidRequest(format!("Malformed request key: {}", s)))?;

        let vary = parts
            .map(|part| {
                part.split_once('=')
                    .map(|(n, v)| (n.to_string(), v.to_string()))
                    .ok_or_else(|| {
                        CacheError::InvalidRequest(format!("Malformed vary component: {}", part))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            method: method.to_string(),
            url: url.to_string(),
            vary,
        })
    }
}
