//! Precache Manifest
//!
//! Resolves the declared precache list into cache keys and maps incoming
//! URLs back onto them.

use std::collections::{HashMap, HashSet};

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::cache::RequestKey;
use crate::error::{CacheError, Result};

/// Query parameter carrying the revision inside a precache key.
pub const REVISION_PARAM: &str = "__WB_REVISION__";

/// Format tag embedded in precache store names. Stores in the precache
/// family with any other tag are outdated.
pub const PRECACHE_FORMAT: &str = "v2";

/// Index document served for directory URLs.
const DIRECTORY_INDEX: &str = "index.html";

/// One declared precache resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecacheEntry {
    pub url: String,
    #[serde(default)]
    pub revision: Option<String>,
}

impl PrecacheEntry {
    pub fn new(url: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            revision: Some(revision.into()),
        }
    }
}

/// A precache entry resolved against the site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntry {
    /// Absolute URL without fragment
    pub url: String,
    pub revision: Option<String>,
    /// Key in the precache store; changes whenever the revision changes
    pub cache_key: RequestKey,
}

/// Name of the precache store for a cache prefix and scope.
pub fn precache_store_name(prefix: &str, scope: &str) -> String {
    format!("{}-precache-{}-{}", prefix, PRECACHE_FORMAT, scope)
}

/// Whether `name` belongs to the precache family for `scope`.
pub fn is_precache_store(name: &str, scope: &str) -> bool {
    name.contains("-precache-") && name.contains(scope)
}

// == Precache Manifest ==
#[derive(Debug, Clone, Default)]
pub struct PrecacheManifest {
    entries: Vec<ResolvedEntry>,
    by_url: HashMap<String, usize>,
}

impl PrecacheManifest {
    /// Resolves entries against `base_url`.
    ///
    /// The same URL listed twice must carry the same revision.
    pub fn new(entries: &[PrecacheEntry], base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| CacheError::InvalidRequest(format!("Invalid base URL '{}': {}", base_url, e)))?;

        let mut manifest = Self::default();
        for entry in entries {
            let mut url = base.join(&entry.url).map_err(|e| {
                CacheError::InvalidRequest(format!("Invalid precache URL '{}': {}", entry.url, e))
            })?;
            url.set_fragment(None);
            let url_str = url.to_string();

            if let Some(&existing) = manifest.by_url.get(&url_str) {
                if manifest.entries[existing].revision != entry.revision {
                    return Err(CacheError::InvalidRequest(format!(
                        "Conflicting precache entries for {}: {:?} vs {:?}",
                        url_str, manifest.entries[existing].revision, entry.revision
                    )));
                }
                continue;
            }

            let mut key_url = url.clone();
            if let Some(revision) = &entry.revision {
                key_url
                    .query_pairs_mut()
                    .append_pair(REVISION_PARAM, revision);
            }

            manifest.by_url.insert(url_str.clone(), manifest.entries.len());
            manifest.entries.push(ResolvedEntry {
                url: url_str,
                revision: entry.revision.clone(),
                cache_key: RequestKey::get(key_url.to_string()),
            });
        }
        Ok(manifest)
    }

    pub fn entries(&self) -> &[ResolvedEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical forms of every cache key in the manifest.
    pub fn cache_keys(&self) -> HashSet<String> {
        self.entries
            .iter()
            .map(|e| e.cache_key.to_string())
            .collect()
    }

    // == Lookup ==
    /// Precache key for a request URL.
    ///
    /// Tries the URL as is, then without tracking parameters (`utm_*`,
    /// `fbclid`), then the directory index for URLs ending in `/`, then the
    /// `.html` clean-URL form.
    pub fn lookup(&self, request_url: &str) -> Option<&RequestKey> {
        let mut url = Url::parse(request_url).ok()?;
        url.set_fragment(None);

        url_variations(url)
            .into_iter()
            .find_map(|candidate| self.by_url.get(candidate.as_str()))
            .map(|&i| &self.entries[i].cache_key)
    }
}

fn url_variations(url: Url) -> Vec<Url> {
    let mut variations = vec![url.clone()];

    let stripped = strip_tracking_params(&url);
    variations.push(stripped.clone());

    if stripped.path().ends_with('/') {
        let mut index = stripped.clone();
        index.set_path(&format!("{}{}", stripped.path(), DIRECTORY_INDEX));
        variations.push(index);
    } else {
        let mut clean = stripped.clone();
        clean.set_path(&format!("{}.html", stripped.path()));
        variations.push(clean);
    }

    variations
}

fn strip_tracking_params(url: &Url) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| !name.starts_with("utm_") && name != "fbclid")
        .map(|(n, v)| (n.into_owned(), v.into_owned()))
        .collect();

    let mut stripped = url.clone();
    if kept.is_empty() {
        stripped.set_query(None);
    } else {
        stripped.query_pairs_mut().clear().extend_pairs(kept);
    }
    stripped
}
