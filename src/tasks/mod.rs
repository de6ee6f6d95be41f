//! Background Tasks Module
//!
//! Contains background tasks that run periodically during service operation.
//!
//! # Tasks
//! - Expired sweep: calls `flush_expired` on the cache at a configured interval

mod sweep;

pub use sweep::spawn_sweep_task;
