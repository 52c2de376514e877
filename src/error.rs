//! Error types for the caching agent
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the caching agent.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Network fetch failed (connectivity, DNS, timeout)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Strategy exhausted both network and cache
    #[error("No cached response for {0}")]
    NoCachedResponse(String),

    /// Persistence layer failure
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Invalid request or configuration data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Returns true when the error came from the persistence layer.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, CacheError::StoreUnavailable(_))
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::StoreUnavailable(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NetworkError(_) => StatusCode::BAD_GATEWAY,
            CacheError::NoCachedResponse(_) => StatusCode::GATEWAY_TIMEOUT,
            CacheError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the caching agent.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (CacheError::NetworkError("x".into()), StatusCode::BAD_GATEWAY),
            (CacheError::NoCachedResponse("x".into()), StatusCode::GATEWAY_TIMEOUT),
            (CacheError::StoreUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (CacheError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
            (CacheError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_io_error_is_store_failure() {
        let err: CacheError = std::io::Error::new(std::io::ErrorKind::Other, "disk gone").into();
        assert!(err.is_store_failure());
    }
}
