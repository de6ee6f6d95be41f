//! API Handlers
//!
//! HTTP request handlers exposing the cache repository operations.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::cache::{
    CommandKind, MemoryOptionsTable, ObjectCache, Repository, Store, StoreCommand, StoreReply,
    TransientCache, TransientStore,
};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    validate_key, AddResponse, DeleteResponse, ExistsResponse, FlushResponse, GetResponse,
    HealthResponse, PutRequest, PutResponse, StatsResponse,
};

/// Application state shared across all handlers.
///
/// The repository synchronizes internally, so it is shared behind a plain `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Shared cache repository
    pub cache: Arc<TransientCache>,
    /// TTL applied when a write carries none
    pub default_ttl: i64,
}

impl AppState {
    /// Creates a new AppState around the given repository.
    pub fn new(cache: TransientCache, default_ttl: i64) -> Self {
        Self {
            cache: Arc::new(cache),
            default_ttl,
        }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Builds an in-process options table and a transient store namespaced by
    /// the configured prefix.
    pub fn from_config(config: &Config) -> Self {
        let store = TransientStore::new(Arc::new(MemoryOptionsTable::new()), &config.cache_prefix)
            .with_object_cache(ObjectCache::from_flag(config.external_object_cache));

        let mut cache = Repository::new(store);
        if config.single_flight {
            cache = cache.with_single_flight();
        }

        Self::new(cache, config.default_ttl)
    }
}

fn checked_key(key: &str) -> Result<()> {
    match validate_key(key) {
        Some(error_msg) => Err(CacheError::InvalidRequest(error_msg)),
        None => Ok(()),
    }
}

/// Handler for PUT /entries
///
/// Stores a value under a key with optional TTL.
pub async fn put_handler(
    State(state): State<AppState>,
    Json(req): Json<PutRequest>,
) -> Result<Json<PutResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let ttl = req.ttl.unwrap_or(state.default_ttl);
    state.cache.put(&req.key, &req.value, ttl)?;

    Ok(Json(PutResponse::new(req.key)))
}

/// Handler for POST /entries/add
///
/// Stores a value only if the key is not already cached.
pub async fn add_handler(
    State(state): State<AppState>,
    Json(req): Json<PutRequest>,
) -> Result<Json<AddResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let ttl = req.ttl.unwrap_or(state.default_ttl);
    let added = state.cache.add(&req.key, &req.value, ttl)?;

    Ok(Json(AddResponse {
        key: req.key,
        added,
    }))
}

/// Handler for GET /entries/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    checked_key(&key)?;

    match state.cache.get(&key)? {
        Some(value) => Ok(Json(GetResponse::new(key, value))),
        None => Err(CacheError::NotFound(key)),
    }
}

/// Handler for GET /entries/:key/exists
///
/// Mirrors `Repository::has`: a stored `false` reports `exists: false`.
pub async fn exists_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ExistsResponse>> {
    checked_key(&key)?;

    let exists = state.cache.has(&key)?;
    Ok(Json(ExistsResponse { key, exists }))
}

/// Handler for POST /entries/:key/pull
pub async fn pull_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    checked_key(&key)?;

    match state.cache.pull(&key)? {
        Some(value) => Ok(Json(GetResponse::new(key, value))),
        None => Err(CacheError::NotFound(key)),
    }
}

/// Handler for DELETE /entries/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    checked_key(&key)?;

    if state.cache.forget(&key)? {
        Ok(Json(DeleteResponse::new(key)))
    } else {
        Err(CacheError::NotFound(key))
    }
}

/// Handler for DELETE /entries
pub async fn flush_handler(State(state): State<AppState>) -> Json<FlushResponse> {
    Json(FlushResponse {
        flushed: state.cache.flush(),
    })
}

/// Handler for POST /entries/flush-expired
pub async fn flush_expired_handler(State(state): State<AppState>) -> Json<FlushResponse> {
    Json(FlushResponse {
        flushed: state.cache.flush_expired(),
    })
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let store = state.cache.store();

    let total_entries = if store.supports(CommandKind::Count) {
        match state.cache.call(StoreCommand::Count)? {
            StoreReply::Count(count) => Some(count),
            other => {
                return Err(CacheError::Internal(format!(
                    "unexpected count reply: {:?}",
                    other
                )))
            }
        }
    } else {
        None
    };

    Ok(Json(StatsResponse {
        prefix: store.prefix().to_string(),
        total_entries,
        external_object_cache: store.object_cache().is_external(),
        single_flight: state.cache.is_single_flight(),
    }))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
