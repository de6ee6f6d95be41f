//! API Module
//!
//! HTTP handlers and routing for the cache service REST API.
//!
//! # Endpoints
//! - `PUT /entries`, `POST /entries/add` - Store values
//! - `GET /entries/:key`, `GET /entries/:key/exists` - Read values
//! - `POST /entries/:key/pull`, `DELETE /entries/:key` - Remove values
//! - `DELETE /entries`, `POST /entries/flush-expired` - Bulk flushes
//! - `GET /stats`, `GET /health` - Service status

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
