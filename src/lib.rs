//! Hestia Cache - transient-backed cache repository
//!
//! Wraps a database-backed transient store behind a get/put/remember
//! contract with prefix-scoped flushing, and serves it over HTTP.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{Repository, Store, TransientCache, TransientStore};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::spawn_sweep_task;
