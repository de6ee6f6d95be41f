//! Cache Store Module
//!
//! The backend contract every cache store implements, plus the tagged set of
//! backend-specific extensions a repository can forward to.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};

/// Length of the hex digest produced by [`digest_key`].
pub const DIGEST_LENGTH: usize = 64;

// == Store Contract ==
/// Low-level key/value backend addressed by logical keys.
///
/// Stores hash logical keys into fixed-length physical keys under their
/// namespace prefix. A miss is `Ok(None)`, never an error.
pub trait Store: Send + Sync {
    /// Namespace prefix, including its trailing separator when non-empty.
    fn prefix(&self) -> &str;

    /// Physical key for a logical key.
    fn hash_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix(), digest_key(key))
    }

    /// Stored value, or `None` when absent, expired or stored as `null`.
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Stores `value` for `seconds` (0 = no expiry, negative clamped to 0).
    ///
    /// Rewriting an identical value counts as success.
    fn put(&self, key: &str, value: &Value, seconds: i64) -> Result<bool>;

    /// Deletes an entry, returning whether one was removed.
    fn forget(&self, key: &str) -> Result<bool>;

    /// Deletes every entry under the prefix. `false` means nothing was
    /// guaranteed: the backend cannot be enumerated or the delete failed.
    fn flush(&self) -> bool;

    /// Deletes entries under the prefix whose expiry is strictly in the past.
    fn flush_expired(&self) -> bool;

    /// Whether this store implements a backend extension.
    fn supports(&self, _kind: CommandKind) -> bool {
        false
    }

    /// Executes a backend extension.
    fn execute(&self, command: StoreCommand) -> Result<StoreReply> {
        Err(CacheError::Unsupported(command.kind().name()))
    }
}

// == Extensions ==
/// Backend-specific operations reachable through the repository.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCommand {
    /// Atomic add-if-absent.
    Add {
        key: String,
        value: Value,
        seconds: i64,
    },
    /// Full entry including its expiry.
    Inspect { key: String },
    /// Number of live entries under the prefix.
    Count,
}

/// Discriminant of a [`StoreCommand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Add,
    Inspect,
    Count,
}

impl CommandKind {
    pub fn name(self) -> &'static str {
        match self {
            CommandKind::Add => "add",
            CommandKind::Inspect => "inspect",
            CommandKind::Count => "count",
        }
    }
}

impl StoreCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            StoreCommand::Add { .. } => CommandKind::Add,
            StoreCommand::Inspect { .. } => CommandKind::Inspect,
            StoreCommand::Count => CommandKind::Count,
        }
    }
}

/// Result of a [`StoreCommand`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreReply {
    Written(bool),
    Entry(Option<CacheEntry>),
    Count(usize),
}

// == Key Hashing ==
/// SHA-256 hex digest of a logical key.
pub fn digest_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether `s` has the exact shape [`digest_key`] produces: [`DIGEST_LENGTH`]
/// lowercase hex characters.
pub fn is_digest(s: &str) -> bool {
    s.len() == DIGEST_LENGTH && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Truncates `prefix` to at most `max_len` bytes on a character boundary and
/// appends the `_` separator. An empty prefix stays empty.
pub fn clamp_prefix(prefix: &str, max_len: usize) -> String {
    if prefix.is_empty() {
        return String::new();
    }

    let mut end = prefix.len().min(max_len);
    while !prefix.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}_", &prefix[..end])
}
