//! Cache Module
//!
//! Transient-backed cache: a store contract, a database-backed store and the
//! repository facade callers use.

mod clock;
mod entry;
mod keys;
mod lock;
mod options;
mod repository;
mod store;
mod transient;


// Re-export public types
pub use clock::{current_timestamp, Clock, ManualClock, SystemClock};
pub use entry::{normalize_ttl, CacheEntry, Expiry};
pub use keys::cache_key;
pub use lock::KeyLocks;
pub use options::{MemoryOptionsTable, OptionsTable};
pub use repository::Repository;
pub use store::{digest_key, is_digest, CommandKind, Store, StoreCommand, StoreReply, DIGEST_LENGTH};
pub use transient::{
    ObjectCache, TransientStore, MAX_OPTION_NAME_LENGTH, MAX_PREFIX_LENGTH, TIMEOUT_PREFIX,
    TRANSIENT_PREFIX,
};

/// Repository over the in-process options table, as used by the service.
pub type TransientCache = Repository<TransientStore<MemoryOptionsTable>>;
