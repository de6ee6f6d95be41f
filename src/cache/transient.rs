//! Transient Store Module
//!
//! Database-backed store that keeps each entry as a pair of option rows: the
//! JSON-encoded value under `_transient_<name>` and its absolute expiry under
//! `_transient_timeout_<name>`.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::clock::{Clock, SystemClock};
use crate::cache::entry::{normalize_ttl, CacheEntry, Expiry};
use crate::cache::options::OptionsTable;
use crate::cache::store::{
    clamp_prefix, CommandKind, Store, StoreCommand, StoreReply, DIGEST_LENGTH,
};
use crate::error::{CacheError, Result};

// == Public Constants ==
/// Longest option name the table accepts.
pub const MAX_OPTION_NAME_LENGTH: usize = 191;

/// Row prefix for transient values.
pub const TRANSIENT_PREFIX: &str = "_transient_";

/// Row prefix for transient expiry timestamps.
pub const TIMEOUT_PREFIX: &str = "_transient_timeout_";

/// Marks a namespace prefix that would otherwise read as a timeout row.
pub const PREFIX_ESCAPE: char = '~';

/// Longest namespace prefix that keeps every timeout row name within
/// [`MAX_OPTION_NAME_LENGTH`] once the separator and digest are appended.
pub const MAX_PREFIX_LENGTH: usize =
    MAX_OPTION_NAME_LENGTH - TIMEOUT_PREFIX.len() - 1 - DIGEST_LENGTH;

// == Object Cache Capability ==
/// Where the host keeps transients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectCache {
    /// Rows live in the options table and can be scanned by prefix.
    #[default]
    Database,
    /// An external object cache holds them; it expires entries on its own
    /// and cannot be enumerated, so bulk flushes do nothing.
    External,
}

impl ObjectCache {
    pub fn from_flag(external: bool) -> Self {
        if external {
            ObjectCache::External
        } else {
            ObjectCache::Database
        }
    }

    pub fn is_external(self) -> bool {
        self == ObjectCache::External
    }
}

// == Transient Store ==
/// Store writing transients through an [`OptionsTable`].
pub struct TransientStore<T: OptionsTable> {
    table: Arc<T>,
    prefix: String,
    object_cache: ObjectCache,
    clock: Arc<dyn Clock>,
}

impl<T: OptionsTable> TransientStore<T> {
    // == Constructor ==
    /// Creates a store over `table` namespaced by `prefix`.
    ///
    /// A prefix starting with `timeout` (or with [`PREFIX_ESCAPE`]) gets
    /// [`PREFIX_ESCAPE`] prepended, so its value rows can never be mistaken
    /// for another namespace's timeout rows. Prefixes longer than
    /// [`MAX_PREFIX_LENGTH`] bytes are then truncated.
    pub fn new(table: Arc<T>, prefix: &str) -> Self {
        let prefix = escape_prefix(prefix);
        if prefix.len() > MAX_PREFIX_LENGTH {
            warn!(
                prefix_len = prefix.len(),
                max = MAX_PREFIX_LENGTH,
                "Cache prefix truncated to fit option name limit"
            );
        }

        Self {
            table,
            prefix: clamp_prefix(&prefix, MAX_PREFIX_LENGTH),
            object_cache: ObjectCache::Database,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_object_cache(mut self, object_cache: ObjectCache) -> Self {
        self.object_cache = object_cache;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn table(&self) -> &Arc<T> {
        &self.table
    }

    pub fn object_cache(&self) -> ObjectCache {
        self.object_cache
    }

    fn value_row(name: &str) -> String {
        format!("{}{}", TRANSIENT_PREFIX, name)
    }

    fn timeout_row(name: &str) -> String {
        format!("{}{}", TIMEOUT_PREFIX, name)
    }

    fn namespace_rows(&self) -> (String, String) {
        (
            Self::value_row(&self.prefix),
            Self::timeout_row(&self.prefix),
        )
    }

    fn read_expiry(&self, timeout_row: &str) -> Result<Expiry> {
        match self.table.get(timeout_row)? {
            Some(raw) => Ok(Expiry::At(serde_json::from_str(&raw)?)),
            None => Ok(Expiry::Never),
        }
    }

    fn write_expiry(&self, timeout_row: &str, expiry: Expiry) -> Result<()> {
        match expiry {
            Expiry::At(timeout) => {
                self.table.update(timeout_row, &timeout.to_string())?;
            }
            Expiry::Never => {
                self.table.delete(timeout_row)?;
            }
        }
        Ok(())
    }

    /// Reads the full entry, deleting it first if it has expired.
    fn load(&self, key: &str) -> Result<Option<CacheEntry>> {
        let name = self.hash_key(key);
        let value_row = Self::value_row(&name);
        let timeout_row = Self::timeout_row(&name);

        let expires_at = self.read_expiry(&timeout_row)?;
        if expires_at.is_expired(self.clock.now()) {
            self.table.delete(&value_row)?;
            self.table.delete(&timeout_row)?;
            debug!(physical_key = %name, "Transient expired on read");
            return Ok(None);
        }

        let Some(raw) = self.table.get(&value_row)? else {
            return Ok(None);
        };

        Ok(Some(CacheEntry {
            physical_key: name,
            value: serde_json::from_str(&raw)?,
            expires_at,
        }))
    }

    fn add(&self, key: &str, value: &Value, seconds: i64) -> Result<bool> {
        let name = self.hash_key(key);
        let value_row = Self::value_row(&name);

        match self.load(key)? {
            Some(entry) if !entry.value.is_null() => return Ok(false),
            Some(_) => {
                self.table.delete(&value_row)?;
            }
            None => {}
        }

        let encoded = serde_json::to_string(value)?;
        if !self.table.add(&value_row, &encoded)? {
            debug!(physical_key = %name, "Concurrent writer won add");
            return Ok(false);
        }

        let expiry = Expiry::from_ttl(self.clock.now(), seconds);
        self.write_expiry(&Self::timeout_row(&name), expiry)?;
        Ok(true)
    }

    fn count(&self) -> Result<usize> {
        let (value_prefix, _) = self.namespace_rows();
        let now = self.clock.now();

        let mut live = 0;
        for value_row in self.table.namespace_names(&value_prefix)? {
            let name = &value_row[TRANSIENT_PREFIX.len()..];
            if !self.read_expiry(&Self::timeout_row(name))?.is_expired(now) {
                live += 1;
            }
        }
        Ok(live)
    }
}

fn escape_prefix(prefix: &str) -> String {
    if prefix.starts_with("timeout") || prefix.starts_with(PREFIX_ESCAPE) {
        format!("{}{}", PREFIX_ESCAPE, prefix)
    } else {
        prefix.to_string()
    }
}

impl<T: OptionsTable> Store for TransientStore<T> {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self
            .load(key)?
            .map(|entry| entry.value)
            .filter(|value| !value.is_null()))
    }

    fn put(&self, key: &str, value: &Value, seconds: i64) -> Result<bool> {
        let name = self.hash_key(key);
        let encoded = serde_json::to_string(value)?;
        let expiry = Expiry::from_ttl(self.clock.now(), normalize_ttl(seconds));

        self.write_expiry(&Self::timeout_row(&name), expiry)?;
        if !self.table.update(&Self::value_row(&name), &encoded)? {
            debug!(physical_key = %name, "Transient value unchanged");
        }
        Ok(true)
    }

    fn forget(&self, key: &str) -> Result<bool> {
        let name = self.hash_key(key);

        let deleted = self.table.delete(&Self::value_row(&name))?;
        if deleted {
            self.table.delete(&Self::timeout_row(&name))?;
        }
        Ok(deleted)
    }

    fn flush(&self) -> bool {
        if self.object_cache.is_external() {
            debug!(prefix = %self.prefix, "Flush skipped: external object cache");
            return false;
        }

        let (value_prefix, timeout_prefix) = self.namespace_rows();
        let result = self
            .table
            .delete_namespace(&value_prefix)
            .and_then(|values| Ok(values + self.table.delete_namespace(&timeout_prefix)?));

        match result {
            Ok(removed) => {
                info!(prefix = %self.prefix, removed, "Flushed transients");
                true
            }
            Err(e) => {
                warn!(prefix = %self.prefix, error = %e, "Transient flush failed");
                false
            }
        }
    }

    fn flush_expired(&self) -> bool {
        if self.object_cache.is_external() {
            debug!(prefix = %self.prefix, "Expired flush skipped: external object cache");
            return false;
        }

        let (value_prefix, timeout_prefix) = self.namespace_rows();
        match self
            .table
            .delete_expired(&value_prefix, &timeout_prefix, self.clock.now())
        {
            Ok(removed) => {
                debug!(prefix = %self.prefix, removed, "Flushed expired transients");
                true
            }
            Err(e) => {
                warn!(prefix = %self.prefix, error = %e, "Expired transient flush failed");
                false
            }
        }
    }

    fn supports(&self, kind: CommandKind) -> bool {
        match kind {
            CommandKind::Add | CommandKind::Inspect => true,
            CommandKind::Count => !self.object_cache.is_external(),
        }
    }

    fn execute(&self, command: StoreCommand) -> Result<StoreReply> {
        if !self.supports(command.kind()) {
            return Err(CacheError::Unsupported(command.kind().name()));
        }

        match command {
            StoreCommand::Add {
                key,
                value,
                seconds,
            } => Ok(StoreReply::Written(self.add(&key, &value, seconds)?)),
            StoreCommand::Inspect { key } => Ok(StoreReply::Entry(self.load(&key)?)),
            StoreCommand::Count => Ok(StoreReply::Count(self.count()?)),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use crate::cache::options::MemoryOptionsTable;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn store_with_clock(prefix: &str) -> (TransientStore<MemoryOptionsTable>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(NOW));
        let store = TransientStore::new(Arc::new(MemoryOptionsTable::new()), prefix)
            .with_clock(clock.clone());
        (store, clock)
    }

    struct FailingTable;

    impl OptionsTable for FailingTable {
        fn get(&self, _name: &str) -> Result<Option<String>> {
            Err(CacheError::Backend("table offline".into()))
        }
        fn add(&self, _name: &str, _value: &str) -> Result<bool> {
            Err(CacheError::Backend("table offline".into()))
        }
        fn update(&self, _name: &str, _value: &str) -> Result<bool> {
            Err(CacheError::Backend("table offline".into()))
        }
        fn delete(&self, _name: &str) -> Result<bool> {
            Err(CacheError::Backend("table offline".into()))
        }
        fn delete_namespace(&self, _prefix: &str) -> Result<usize> {
            Err(CacheError::Backend("table offline".into()))
        }
        fn delete_expired(&self, _v: &str, _t: &str, _now: i64) -> Result<usize> {
            Err(CacheError::Backend("table offline".into()))
        }
        fn namespace_names(&self, _prefix: &str) -> Result<Vec<String>> {
            Err(CacheError::Backend("table offline".into()))
        }
    }

    #[test]
    fn test_put_writes_value_and_timeout_rows() {
        let (store, _clock) = store_with_clock("hestia");
        store.put("k", &json!("<ul></ul>"), 60).unwrap();

        let name = store.hash_key("k");
        let table = store.table();
        assert_eq!(
            table.get(&format!("_transient_{name}")).unwrap().as_deref(),
            Some("\"<ul></ul>\"")
        );
        assert_eq!(
            table.get(&format!("_transient_timeout_{name}")).unwrap().as_deref(),
            Some((NOW + 60).to_string().as_str())
        );
    }

    #[test]
    fn test_put_without_ttl_has_no_timeout_row() {
        let (store, _clock) = store_with_clock("hestia");
        store.put("k", &json!(1), 60).unwrap();
        store.put("k", &json!(2), 0).unwrap();

        let name = store.hash_key("k");
        assert!(store
            .table()
            .get(&format!("_transient_timeout_{name}"))
            .unwrap()
            .is_none());
        assert_eq!(store.get("k").unwrap(), Some(json!(2)));
    }

    #[test]
    fn test_put_identical_value_is_success() {
        let (store, _clock) = store_with_clock("hestia");

        assert!(store.put("k", &json!({"a": 1}), 0).unwrap());
        assert!(store.put("k", &json!({"a": 1}), 0).unwrap());
    }

    #[test]
    fn test_negative_ttl_is_forever() {
        let (store, clock) = store_with_clock("hestia");
        store.put("k", &json!("v"), -5).unwrap();

        clock.advance(10_000_000);
        assert_eq!(store.get("k").unwrap(), Some(json!("v")));
    }

    #[test]
    fn test_get_deletes_expired_pair() {
        let (store, clock) = store_with_clock("hestia");
        store.put("k", &json!("v"), 10).unwrap();

        clock.advance(10);
        assert_eq!(store.get("k").unwrap(), Some(json!("v")));

        clock.advance(1);
        assert_eq!(store.get("k").unwrap(), None);
        assert!(store.table().is_empty());
    }

    #[test]
    fn test_stored_false_is_not_a_miss_at_store_level() {
        let (store, _clock) = store_with_clock("hestia");
        store.put("f", &json!(false), 0).unwrap();
        store.put("n", &Value::Null, 0).unwrap();

        assert_eq!(store.get("f").unwrap(), Some(json!(false)));
        assert_eq!(store.get("n").unwrap(), None);
    }

    #[test]
    fn test_forget() {
        let (store, _clock) = store_with_clock("hestia");
        store.put("k", &json!("v"), 60).unwrap();

        assert!(store.forget("k").unwrap());
        assert!(!store.forget("k").unwrap());
        assert!(store.table().is_empty());
    }

    #[test]
    fn test_flush_is_scoped_to_prefix() {
        let table = Arc::new(MemoryOptionsTable::new());
        let a = TransientStore::new(table.clone(), "A");
        let b = TransientStore::new(table.clone(), "B");

        a.put("k", &json!(1), 60).unwrap();
        b.put("k", &json!(2), 60).unwrap();
        table.add("siteurl", "https://example.test").unwrap();

        assert!(b.flush());
        assert_eq!(a.get("k").unwrap(), Some(json!(1)));
        assert_eq!(b.get("k").unwrap(), None);
        assert!(table.get("siteurl").unwrap().is_some());
        assert_eq!(table.len(), 3, "A's value and timeout rows plus siteurl");
    }

    #[test]
    fn test_flush_expired_is_selective() {
        let table = Arc::new(MemoryOptionsTable::new());
        let clock = Arc::new(ManualClock::new(NOW));
        let a = TransientStore::new(table.clone(), "A").with_clock(clock.clone());
        let b = TransientStore::new(table.clone(), "B").with_clock(clock.clone());

        a.put("short", &json!(1), 5).unwrap();
        a.put("long", &json!(2), 500).unwrap();
        a.put("forever", &json!(3), 0).unwrap();
        b.put("short", &json!(4), 5).unwrap();

        clock.advance(60);
        assert!(a.flush_expired());

        assert_eq!(a.execute(StoreCommand::Count).unwrap(), StoreReply::Count(2));
        assert!(a.table().get(&format!("_transient_{}", a.hash_key("short"))).unwrap().is_none());
        // B was not swept, its row is still physically present.
        assert!(table.get(&format!("_transient_{}", b.hash_key("short"))).unwrap().is_some());
    }

    #[test]
    fn test_flush_leaves_extending_namespace() {
        let table = Arc::new(MemoryOptionsTable::new());
        let a = TransientStore::new(table.clone(), "a");
        let a_b = TransientStore::new(table.clone(), "a_b");

        a.put("k", &json!("gone"), 60).unwrap();
        a_b.put("k", &json!("survive"), 60).unwrap();

        assert!(a.flush());
        assert_eq!(a.get("k").unwrap(), None);
        assert_eq!(a_b.get("k").unwrap(), Some(json!("survive")));
        assert_eq!(table.len(), 2, "a_b's value and timeout rows");
    }

    #[test]
    fn test_flush_expired_leaves_extending_namespace() {
        let table = Arc::new(MemoryOptionsTable::new());
        let clock = Arc::new(ManualClock::new(NOW));
        let a = TransientStore::new(table.clone(), "a").with_clock(clock.clone());
        let a_b = TransientStore::new(table.clone(), "a_b").with_clock(clock.clone());

        a_b.put("k", &json!("v"), 10).unwrap();
        clock.advance(100);
        assert!(a.flush_expired());

        let name = a_b.hash_key("k");
        assert!(table.get(&format!("_transient_{name}")).unwrap().is_some());
        assert!(table.get(&format!("_transient_timeout_{name}")).unwrap().is_some());
    }

    #[test]
    fn test_timeout_prefix_flush_keeps_other_expiries() {
        let table = Arc::new(MemoryOptionsTable::new());
        let clock = Arc::new(ManualClock::new(NOW));
        let hestia = TransientStore::new(table.clone(), "hestia").with_clock(clock.clone());
        let timeout = TransientStore::new(table.clone(), "timeout").with_clock(clock.clone());
        let nested = TransientStore::new(table.clone(), "timeout_hestia").with_clock(clock.clone());

        hestia.put("k", &json!("v"), 10).unwrap();
        assert!(timeout.flush());
        assert!(nested.flush());

        clock.advance(100);
        assert_eq!(hestia.get("k").unwrap(), None, "entry still expires");
    }

    #[test]
    fn test_timeout_like_prefixes_are_escaped() {
        let table = Arc::new(MemoryOptionsTable::new());
        let empty = TransientStore::new(table.clone(), "");
        let timeout = TransientStore::new(table.clone(), "timeout");

        assert_eq!(timeout.prefix(), "~timeout_");
        assert_eq!(TransientStore::new(table.clone(), "~x").prefix(), "~~x_");
        assert_eq!(TransientStore::new(table.clone(), "time").prefix(), "time_");

        empty.put("k", &json!("empty"), 60).unwrap();
        timeout.put("k", &json!("timeout"), 0).unwrap();
        assert!(timeout.flush());
        assert_eq!(empty.get("k").unwrap(), Some(json!("empty")));
        assert_eq!(timeout.get("k").unwrap(), None);
    }

    #[test]
    fn test_empty_prefix_flush_keeps_named_namespaces() {
        let table = Arc::new(MemoryOptionsTable::new());
        let empty = TransientStore::new(table.clone(), "");
        let named = TransientStore::new(table.clone(), "hestia");

        empty.put("k", &json!(1), 60).unwrap();
        named.put("k", &json!(2), 60).unwrap();

        assert!(empty.flush());
        assert_eq!(empty.get("k").unwrap(), None);
        assert_eq!(named.get("k").unwrap(), Some(json!(2)));
    }

    #[test]
    fn test_external_object_cache_skips_bulk_operations() {
        let (store, _clock) = store_with_clock("hestia");
        let store = store.with_object_cache(ObjectCache::External);
        store.put("k", &json!(1), 60).unwrap();

        assert!(!store.flush());
        assert!(!store.flush_expired());
        assert_eq!(store.get("k").unwrap(), Some(json!(1)));
        assert!(!store.supports(CommandKind::Count));
        assert!(matches!(
            store.execute(StoreCommand::Count),
            Err(CacheError::Unsupported("count"))
        ));
    }

    #[test]
    fn test_failing_table_flush_returns_false() {
        let store = TransientStore::new(Arc::new(FailingTable), "hestia");

        assert!(!store.flush());
        assert!(!store.flush_expired());
        assert!(matches!(store.get("k"), Err(CacheError::Backend(_))));
    }

    #[test]
    fn test_native_add() {
        let (store, clock) = store_with_clock("hestia");
        let add = |value: i64| StoreCommand::Add {
            key: "k".to_string(),
            value: json!(value),
            seconds: 10,
        };

        assert_eq!(store.execute(add(1)).unwrap(), StoreReply::Written(true));
        assert_eq!(store.execute(add(2)).unwrap(), StoreReply::Written(false));
        assert_eq!(store.get("k").unwrap(), Some(json!(1)));

        clock.advance(11);
        assert_eq!(store.execute(add(3)).unwrap(), StoreReply::Written(true));
        assert_eq!(store.get("k").unwrap(), Some(json!(3)));
    }

    #[test]
    fn test_inspect_reports_expiry() {
        let (store, _clock) = store_with_clock("hestia");
        store.put("k", &json!("v"), 30).unwrap();

        let reply = store
            .execute(StoreCommand::Inspect {
                key: "k".to_string(),
            })
            .unwrap();

        let StoreReply::Entry(Some(entry)) = reply else {
            panic!("expected entry, got {reply:?}");
        };
        assert_eq!(entry.physical_key, store.hash_key("k"));
        assert_eq!(entry.value, json!("v"));
        assert_eq!(entry.expires_at, Expiry::At(NOW + 30));
    }

    #[test]
    fn test_prefix_is_clamped() {
        let long = "p".repeat(500);
        let (store, _clock) = store_with_clock(&long);

        assert_eq!(store.prefix().len(), MAX_PREFIX_LENGTH + 1);
        let timeout_row = format!("{}{}", TIMEOUT_PREFIX, store.hash_key("k"));
        assert_eq!(timeout_row.len(), MAX_OPTION_NAME_LENGTH);
    }

    #[test]
    fn test_empty_prefix() {
        let (store, _clock) = store_with_clock("");

        assert_eq!(store.prefix(), "");
        assert_eq!(store.hash_key("k").len(), DIGEST_LENGTH);
    }

    #[test]
    fn test_corrupt_value_row_is_serialization_error() {
        let (store, _clock) = store_with_clock("hestia");
        let name = store.hash_key("k");
        store
            .table()
            .add(&format!("_transient_{name}"), "{broken")
            .unwrap();

        assert!(matches!(store.get("k"), Err(CacheError::Serialization(_))));
    }
}
