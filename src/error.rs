//! Error types for the cache
//!
//! Provides unified error handling using thiserror. Cache misses are not
//! errors; they surface as `Ok(None)` from the repository.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache layer and its HTTP surface.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key not found in cache (HTTP surface only)
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A value could not be encoded or a stored row could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing options table reported a failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// A backend extension was invoked on a store that does not provide it
    #[error("Unsupported store operation: {0}")]
    Unsupported(&'static str),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Serialization(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CacheError::Backend(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
            CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
