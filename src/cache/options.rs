//! Options Table Module
//!
//! The database handle a transient store writes through: a table of named
//! string rows supporting point reads/writes and namespace-scoped bulk deletes.

use std::collections::BTreeMap;
use std::sync::RwLock;

use tracing::debug;

use super::lock::{rw_read, rw_write};
use super::store::is_digest;
use crate::error::Result;

const SOURCE: &str = "cache::options";

// == Options Table ==
/// Row-level operations over a table keyed by option name.
///
/// Implementations report failures as `CacheError::Backend`.
pub trait OptionsTable: Send + Sync {
    /// Reads a row.
    fn get(&self, name: &str) -> Result<Option<String>>;

    /// Inserts a row only if no row with that name exists.
    fn add(&self, name: &str, value: &str) -> Result<bool>;

    /// Inserts or replaces a row. Returns `false` when the stored value
    /// already equals `value` and nothing was written.
    fn update(&self, name: &str, value: &str) -> Result<bool>;

    /// Deletes a row, returning whether it existed.
    fn delete(&self, name: &str) -> Result<bool>;

    /// Deletes every row in the namespace `prefix`.
    ///
    /// A row is in the namespace when its name is `prefix` followed by exactly
    /// one key digest. Rows of longer namespaces sharing the same leading text
    /// (`a_` vs `a_b_`) are left alone.
    fn delete_namespace(&self, prefix: &str) -> Result<usize>;

    /// Deletes value/timeout pairs whose timeout is strictly less than `now`.
    ///
    /// Value rows are the rows in the `value_prefix` namespace; each one's
    /// timeout row is `timeout_prefix` followed by the same digest.
    fn delete_expired(&self, value_prefix: &str, timeout_prefix: &str, now: i64)
        -> Result<usize>;

    /// Names of every row in the namespace `prefix`, in ascending order.
    fn namespace_names(&self, prefix: &str) -> Result<Vec<String>>;
}

// == Memory Options Table ==
/// In-process options table backed by an ordered map.
#[derive(Debug, Default)]
pub struct MemoryOptionsTable {
    rows: RwLock<BTreeMap<String, String>>,
}

impl MemoryOptionsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of rows, across every namespace.
    pub fn len(&self) -> usize {
        rw_read(&self.rows, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn namespaced<'a>(
    rows: &'a BTreeMap<String, String>,
    prefix: &'a str,
) -> impl Iterator<Item = (&'a String, &'a String)> + 'a {
    rows.range(prefix.to_string()..)
        .take_while(move |(name, _)| name.starts_with(prefix))
        .filter(move |(name, _)| is_digest(&name[prefix.len()..]))
}

impl OptionsTable for MemoryOptionsTable {
    fn get(&self, name: &str) -> Result<Option<String>> {
        Ok(rw_read(&self.rows, SOURCE, "get").get(name).cloned())
    }

    fn add(&self, name: &str, value: &str) -> Result<bool> {
        let mut rows = rw_write(&self.rows, SOURCE, "add");
        if rows.contains_key(name) {
            return Ok(false);
        }
        rows.insert(name.to_string(), value.to_string());
        Ok(true)
    }

    fn update(&self, name: &str, value: &str) -> Result<bool> {
        let mut rows = rw_write(&self.rows, SOURCE, "update");
        if rows.get(name).is_some_and(|current| current == value) {
            return Ok(false);
        }
        rows.insert(name.to_string(), value.to_string());
        Ok(true)
    }

    fn delete(&self, name: &str) -> Result<bool> {
        Ok(rw_write(&self.rows, SOURCE, "delete")
            .remove(name)
            .is_some())
    }

    fn delete_namespace(&self, prefix: &str) -> Result<usize> {
        let mut rows = rw_write(&self.rows, SOURCE, "delete_namespace");
        let doomed: Vec<String> = namespaced(&rows, prefix).map(|(name, _)| name.clone()).collect();

        for name in &doomed {
            rows.remove(name);
        }

        debug!(prefix, removed = doomed.len(), "Deleted namespace options");
        Ok(doomed.len())
    }

    fn delete_expired(
        &self,
        value_prefix: &str,
        timeout_prefix: &str,
        now: i64,
    ) -> Result<usize> {
        let mut rows = rw_write(&self.rows, SOURCE, "delete_expired");

        let expired: Vec<(String, String)> = namespaced(&rows, value_prefix)
            .filter_map(|(name, _)| {
                let timeout_name = format!("{}{}", timeout_prefix, &name[value_prefix.len()..]);
                let timeout: i64 = rows.get(&timeout_name)?.trim().parse().ok()?;
                (timeout < now).then(|| (name.clone(), timeout_name))
            })
            .collect();

        for (value_name, timeout_name) in &expired {
            rows.remove(value_name);
            rows.remove(timeout_name);
        }

        debug!(value_prefix, pairs = expired.len(), "Deleted expired option pairs");
        Ok(expired.len())
    }

    fn namespace_names(&self, prefix: &str) -> Result<Vec<String>> {
        let rows = rw_read(&self.rows, SOURCE, "namespace_names");
        Ok(namespaced(&rows, prefix).map(|(name, _)| name.clone()).collect())
    }
}
