//! Lock helpers
//!
//! Poison-tolerant guards for the in-process table and the per-key lock set
//! used for single-flight `remember`/`add`/`pull`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!(
            op,
            target_module = target,
            lock_kind = "rwlock.read",
            "Recovered from poisoned cache lock"
        );
        poisoned.into_inner()
    })
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!(
            op,
            target_module = target,
            lock_kind = "rwlock.write",
            "Recovered from poisoned cache lock"
        );
        poisoned.into_inner()
    })
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!(
            op,
            target_module = target,
            lock_kind = "mutex.lock",
            "Recovered from poisoned cache lock"
        );
        poisoned.into_inner()
    })
}

const SOURCE: &str = "cache::lock";

// == Key Locks ==
/// One mutex per physical key, created on demand and dropped when idle.
#[derive(Debug, Default)]
pub struct KeyLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the lock for `key`.
    ///
    /// `f` must not acquire the same key again; the lock is not reentrant.
    pub fn with_lock<R>(&self, key: &str, f: impl FnOnce() -> R) -> R {
        let slot = {
            let mut slots = mutex_lock(&self.slots, SOURCE, "acquire_slot");
            Arc::clone(slots.entry(key.to_string()).or_default())
        };

        let result = {
            let _guard = mutex_lock(&slot, SOURCE, "with_lock");
            f()
        };

        // Map entry plus our clone: nobody else is waiting on this key.
        let mut slots = mutex_lock(&self.slots, SOURCE, "release_slot");
        if Arc::strong_count(&slot) == 2 {
            slots.remove(key);
        }

        result
    }

    /// Number of keys currently holding a lock slot.
    pub fn len(&self) -> usize {
        mutex_lock(&self.slots, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
