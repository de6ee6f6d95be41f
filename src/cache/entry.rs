//! Cache Entry Module
//!
//! Describes a single stored transient: its physical key, value and expiry.

use serde::Serialize;
use serde_json::Value;

// == Expiry ==
/// Absolute expiry of a stored entry.
///
/// The backend encodes `Never` as the absence of a timeout row, which is
/// what a TTL of 0 produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Expiry {
    Never,
    At(i64),
}

impl Expiry {
    /// Expiry for a write performed at `now` with the given TTL.
    pub fn from_ttl(now: i64, seconds: i64) -> Self {
        match normalize_ttl(seconds) {
            0 => Expiry::Never,
            ttl => Expiry::At(now.saturating_add(ttl)),
        }
    }

    /// Checks if the entry has expired.
    ///
    /// Boundary condition: an entry whose timeout equals `now` is still live.
    /// It expires once the timeout is strictly less than the current time,
    /// matching the comparison used by the expired-entry sweep.
    pub fn is_expired(&self, now: i64) -> bool {
        match self {
            Expiry::At(timeout) => *timeout < now,
            Expiry::Never => false,
        }
    }

    /// Returns remaining TTL in seconds, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(0)` if the entry has expired
    /// - `Some(remaining_seconds)` if the entry has TTL and hasn't expired
    /// - `None` if the entry never expires
    pub fn ttl_remaining(&self, now: i64) -> Option<u64> {
        match self {
            Expiry::At(timeout) if *timeout > now => Some((*timeout - now) as u64),
            Expiry::At(_) => Some(0),
            Expiry::Never => None,
        }
    }
}

// == Cache Entry ==
/// A stored entry as seen through the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    /// Hashed, prefixed key addressing the entry in the backend
    pub physical_key: String,
    /// The stored value
    pub value: Value,
    /// When the entry expires
    pub expires_at: Expiry,
}

/// Clamps a caller-supplied TTL: negative values mean "no expiry".
pub fn normalize_ttl(seconds: i64) -> i64 {
    seconds.max(0)
}
