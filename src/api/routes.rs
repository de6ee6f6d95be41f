//! API Routes
//!
//! Configures the Axum router with all cache service endpoints.

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    add_handler, delete_handler, exists_handler, flush_expired_handler, flush_handler,
    get_handler, health_handler, pull_handler, put_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `PUT /entries` - Store a value
/// - `DELETE /entries` - Flush every entry under the prefix
/// - `POST /entries/add` - Store a value if absent
/// - `POST /entries/flush-expired` - Flush expired entries
/// - `GET /entries/:key` - Retrieve a value
/// - `DELETE /entries/:key` - Forget a value
/// - `GET /entries/:key/exists` - Existence check
/// - `POST /entries/:key/pull` - Retrieve and forget a value
/// - `GET /stats` - Namespace statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/entries", put(put_handler).delete(flush_handler))
        .route("/entries/add", post(add_handler))
        .route("/entries/flush-expired", post(flush_expired_handler))
        .route("/entries/:key", get(get_handler).delete(delete_handler))
        .route("/entries/:key/exists", get(exists_handler))
        .route("/entries/:key/pull", post(pull_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
