//! Cacheable Response Filter
//!
//! Decides whether a response may be written to a store.

use std::collections::BTreeSet;

use crate::cache::CachedResponse;

/// Status/header allow-list applied before every store write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheableResponseFilter {
    statuses: BTreeSet<u16>,
    headers: Vec<(String, String)>,
}

impl CacheableResponseFilter {
    /// Accepts responses whose status is in `statuses`.
    pub fn new(statuses: impl IntoIterator<Item = u16>) -> Self {
        Self {
            statuses: statuses.into_iter().collect(),
            headers: Vec::new(),
        }
    }

    /// Only `200`.
    pub fn ok_only() -> Self {
        Self::new([200])
    }

    /// `200` plus opaque (`0`) responses.
    pub fn ok_and_opaque() -> Self {
        Self::new([0, 200])
    }

    /// Additionally require `name: value` on the response.
    pub fn require_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    pub fn statuses(&self) -> &BTreeSet<u16> {
        &self.statuses
    }

    pub fn is_cacheable(&self, response: &CachedResponse) -> bool {
        if !self.statuses.contains(&response.status) {
            return false;
        }
        self.headers
            .iter()
            .all(|(name, value)| response.header(name) == Some(value.as_str()))
    }
}
