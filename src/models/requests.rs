//! Request DTOs for the cache service API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;
use serde_json::Value;

/// Longest logical key accepted over HTTP.
pub const MAX_KEY_LENGTH: usize = 256;

/// Request body for PUT /entries and POST /entries/add
///
/// # Fields
/// - `key`: The logical cache key
/// - `value`: Any JSON value
/// - `ttl`: Optional TTL in seconds (service default if absent, 0 = forever,
///   negative values are treated as 0)
#[derive(Debug, Clone, Deserialize)]
pub struct PutRequest {
    /// The cache key
    pub key: String,
    /// The value to store
    pub value: Value,
    /// Optional TTL in seconds
    #[serde(default)]
    pub ttl: Option<i64>,
}

impl PutRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if let Some(error) = validate_key(&self.key) {
            return Some(error);
        }
        if self.value.is_null() {
            return Some("Value cannot be null".to_string());
        }
        None
    }
}

/// Validates a key taken from a request body or path.
pub fn validate_key(key: &str) -> Option<String> {
    if key.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    if key.len() > MAX_KEY_LENGTH {
        return Some(format!(
            "Key exceeds maximum length of {} characters",
            MAX_KEY_LENGTH
        ));
    }
    None
}
