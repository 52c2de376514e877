//! Cache Entry Module
//!
//! Defines stored responses and their on-disk encoding.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::cache::RequestKey;
use crate::error::{CacheError, Result};

// == Cached Response ==
/// A response as seen by the strategies and persisted by the stores.
///
/// Status `0` marks an opaque cross-origin response.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: u16,
    /// Header names are stored lowercased
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Opaque responses expose neither status nor headers.
    pub fn opaque(body: impl Into<Bytes>) -> Self {
        Self::new(0, body)
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_opaque(&self) -> bool {
        self.status == 0
    }

    /// 2xx status.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// == Cache Entry ==
/// A response stored under a request key.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: RequestKey,
    /// Unix milliseconds at which the entry was written
    pub stored_at: i64,
    /// Insertion sequence, breaks ties between equal `stored_at`
    pub seq: u64,
    pub response: CachedResponse,
}

/// Metadata written ahead of the body.
#[derive(Serialize, Deserialize)]
struct EntryHeader {
    key: RequestKey,
    stored_at: i64,
    seq: u64,
    status: u16,
    headers: Vec<(String, String)>,
}

impl CacheEntry {
    /// Age of the entry in milliseconds relative to `now_ms`.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        (now_ms - self.stored_at).max(0)
    }

    /// Encodes the entry as a `u32` big-endian header length, a JSON header
    /// and the raw body.
    pub fn encode(&self) -> Result<Bytes> {
        let header = EntryHeader {
            key: self.key.clone(),
            stored_at: self.stored_at,
            seq: self.seq,
            status: self.response.status,
            headers: self.response.headers.clone(),
        };
        let header = serde_json::to_vec(&header)
            .map_err(|e| CacheError::Internal(format!("Failed to encode entry: {}", e)))?;
        let header_len = u32::try_from(header.len())
            .map_err(|_| CacheError::Internal("Entry header too large".to_string()))?;

        let mut buf = BytesMut::with_capacity(4 + header.len() + self.response.body.len());
        buf.put_u32(header_len);
        buf.put_slice(&header);
        buf.put_slice(&self.response.body);
        Ok(buf.freeze())
    }

    /// Decodes an entry written by [`CacheEntry::encode`].
    pub fn decode(data: Bytes) -> Result<Self> {
        if data.len() < 4 {
            return Err(CacheError::StoreUnavailable(
                "Truncated cache entry".to_string(),
            ));
        }
        let header_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if data.len() < 4 + header_len {
            return Err(CacheError::StoreUnavailable(
                "Truncated cache entry header".to_string(),
            ));
        }

        let header: EntryHeader = serde_json::from_slice(&data[4..4 + header_len])
            .map_err(|e| CacheError::StoreUnavailable(format!("Corrupt cache entry: {}", e)))?;

        Ok(Self {
            key: header.key,
            stored_at: header.stored_at,
            seq: header.seq,
            response: CachedResponse {
                status: header.status,
                headers: header.headers,
                body: data.slice(4 + header_len..),
            },
        })
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> CacheEntry {
        CacheEntry {
            key: RequestKey::get("https://site.test/logo.png"),
            stored_at: 1_700_000_000_000,
            seq: 7,
            response: CachedResponse::new(200, &b"\x89PNG"[..]).with_header("Content-Type", "image/png"),
        }
    }

    #[test]
    fn test_encoded_entry_decodes_to_same_entry() {
        let entry = sample_entry();
        let decoded = CacheEntry::decode(entry.encode().unwrap()).unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(decoded.response.header("content-type"), Some("image/png"));
    }

    #[test]
    fn test_truncated_entry_is_store_failure() {
        let encoded = sample_entry().encode().unwrap();
        let result = CacheEntry::decode(encoded.slice(0..10));
        assert!(matches!(result, Err(CacheError::StoreUnavailable(_))));

        let result = CacheEntry::decode(Bytes::from_static(b"\x00"));
        assert!(matches!(result, Err(CacheError::StoreUnavailable(_))));
    }

    #[test]
    fn test_age_never_negative() {
        let entry = sample_entry();
        assert_eq!(entry.age_ms(entry.stored_at - 5), 0);
        assert_eq!(entry.age_ms(entry.stored_at + 1500), 1500);
    }

    #[test]
    fn test_opaque_response() {
        let response = CachedResponse::opaque("body");
        assert!(response.is_opaque());
        assert!(!response.is_ok());
        assert!(CachedResponse::new(204, "").is_ok());
    }
}
