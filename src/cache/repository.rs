//! Cache Repository Module
//!
//! Facade over a [`Store`] adding defaults, existence checks, `pull`, `add`
//! emulation and the `remember` memoization pattern.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::cache::lock::KeyLocks;
use crate::cache::store::{CommandKind, Store, StoreCommand, StoreReply};
use crate::error::{CacheError, Result};

// == Repository ==
/// Uniform cache contract over a single store.
///
/// The repository holds no entries; every read goes to the store. Without
/// single-flight, `add`, `pull` and `remember` are check-then-act sequences
/// and concurrent callers may both miss and both write (last write wins).
pub struct Repository<S: Store> {
    store: S,
    locks: Option<KeyLocks>,
}

impl<S: Store> Repository<S> {
    // == Constructor ==
    pub fn new(store: S) -> Self {
        Self { store, locks: None }
    }

    /// Serializes `add`, `pull` and `remember` per physical key, so `compute`
    /// runs once per key even under concurrent callers.
    ///
    /// A `compute` closure must not call back into this repository for the
    /// same key while single-flight is enabled.
    pub fn with_single_flight(mut self) -> Self {
        self.locks = Some(KeyLocks::new());
        self
    }

    pub fn is_single_flight(&self) -> bool {
        self.locks.is_some()
    }

    /// The wrapped store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn exclusive<R>(&self, key: &str, f: impl FnOnce() -> R) -> R {
        match &self.locks {
            Some(locks) => locks.with_lock(&self.store.hash_key(key), f),
            None => f(),
        }
    }

    // == Reads ==
    /// Cached value, or `None` on a miss.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        self.store.get(key)
    }

    /// Cached value, or `default` on a miss.
    pub fn get_or(&self, key: &str, default: Value) -> Result<Value> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Cached value decoded as `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)?
            .map(serde_json::from_value)
            .transpose()
            .map_err(CacheError::from)
    }

    /// Whether a value is cached for `key`.
    ///
    /// A stored `false` (the transient "not found" marker) or `null` is
    /// reported as absent, even though `get` returns `Some(false)` for the
    /// former. Use `get` when falsy values matter.
    pub fn has(&self, key: &str) -> Result<bool> {
        Ok(!matches!(
            self.get(key)?,
            None | Some(Value::Null) | Some(Value::Bool(false))
        ))
    }

    // == Writes ==
    pub fn put(&self, key: &str, value: &Value, seconds: i64) -> Result<bool> {
        self.store.put(key, value, seconds)
    }

    pub fn forget(&self, key: &str) -> Result<bool> {
        self.store.forget(key)
    }

    /// Stores `value` only if `key` is not already cached.
    ///
    /// Delegates to the store's native add when it has one; otherwise falls
    /// back to `has` followed by `put`.
    pub fn add(&self, key: &str, value: &Value, seconds: i64) -> Result<bool> {
        if self.store.supports(CommandKind::Add) {
            let command = StoreCommand::Add {
                key: key.to_string(),
                value: value.clone(),
                seconds,
            };
            return match self.store.execute(command)? {
                StoreReply::Written(written) => Ok(written),
                other => Err(unexpected_reply(CommandKind::Add, &other)),
            };
        }

        self.exclusive(key, || {
            if self.has(key)? {
                return Ok(false);
            }
            self.put(key, value, seconds)
        })
    }

    /// Returns the cached value and removes it.
    pub fn pull(&self, key: &str) -> Result<Option<Value>> {
        self.exclusive(key, || {
            let value = self.get(key)?;
            self.forget(key)?;
            Ok(value)
        })
    }

    pub fn pull_or(&self, key: &str, default: Value) -> Result<Value> {
        Ok(self.pull(key)?.unwrap_or(default))
    }

    // == Remember ==
    /// Returns the cached value, or computes, stores and returns it.
    ///
    /// Only a miss (`None`) triggers `compute`; a stored `false` or `0` is a
    /// hit. The result of `compute` is stored even if the write reports no
    /// change.
    pub fn remember<F>(&self, key: &str, seconds: i64, compute: F) -> Result<Value>
    where
        F: FnOnce() -> Value,
    {
        self.exclusive(key, || {
            if let Some(value) = self.get(key)? {
                return Ok(value);
            }

            debug!(key, seconds, "Cache miss, computing value");
            let value = compute();
            self.put(key, &value, seconds)?;
            Ok(value)
        })
    }

    /// [`Repository::remember`] without expiry.
    pub fn remember_forever<F>(&self, key: &str, compute: F) -> Result<Value>
    where
        F: FnOnce() -> Value,
    {
        self.remember(key, 0, compute)
    }

    /// Typed [`Repository::remember`]: `T` is stored as JSON and decoded on hits.
    pub fn remember_as<T, F>(&self, key: &str, seconds: i64, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        let mut encode_error = None;
        let value = self.remember(key, seconds, || match serde_json::to_value(compute()) {
            Ok(value) => value,
            Err(e) => {
                encode_error = Some(e);
                Value::Null
            }
        });

        if let Some(e) = encode_error {
            // The placeholder null was written; drop it so the next call recomputes.
            self.forget(key)?;
            return Err(e.into());
        }

        Ok(serde_json::from_value(value?)?)
    }

    // == Bulk ==
    pub fn flush(&self) -> bool {
        self.store.flush()
    }

    pub fn flush_expired(&self) -> bool {
        self.store.flush_expired()
    }

    // == Extensions ==
    /// Forwards a backend-specific operation to the store.
    pub fn call(&self, command: StoreCommand) -> Result<StoreReply> {
        self.store.execute(command)
    }
}

fn unexpected_reply(kind: CommandKind, reply: &StoreReply) -> CacheError {
    CacheError::Internal(format!(
        "store answered `{}` with {:?}",
        kind.name(),
        reply
    ))
}
