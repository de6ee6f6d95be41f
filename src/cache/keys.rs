//! Logical key construction for callers that cache rendered output per
//! tag and attribute set.

use serde::Serialize;

use crate::error::{CacheError, Result};

/// Builds `"<tag>:<attributes as JSON>"`.
///
/// Attribute order must be stable for equal inputs to share an entry, so
/// pass a struct or a `BTreeMap`, not a `HashMap`.
pub fn cache_key<A: Serialize + ?Sized>(tag: &str, attributes: &A) -> Result<String> {
    if tag.is_empty() {
        return Err(CacheError::InvalidRequest("cache key tag cannot be empty".to_string()));
    }

    Ok(format!("{}:{}", tag, serde_json::to_string(attributes)?))
}
