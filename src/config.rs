//! Configuration Module
//!
//! Handles loading and managing service configuration from environment variables.

use std::env;

/// Service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace prefix for every transient written by this service
    pub cache_prefix: String,
    /// Default TTL in seconds for writes that carry no explicit TTL (0 = forever)
    pub default_ttl: i64,
    /// HTTP server port
    pub server_port: u16,
    /// Interval in seconds between expired-entry sweeps (0 disables the sweep)
    pub sweep_interval: u64,
    /// Whether transients live in an external, non-enumerable object cache
    pub external_object_cache: bool,
    /// Serialize remember/add/pull per key
    pub single_flight: bool,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_PREFIX` - Transient namespace prefix (default: hestia)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 60)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `SWEEP_INTERVAL` - Expired-entry sweep frequency in seconds (default: 60)
    /// - `EXTERNAL_OBJECT_CACHE` - `true`/`1` when an external object cache is in use (default: false)
    /// - `SINGLE_FLIGHT` - `true`/`1` to enable per-key locking (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            cache_prefix: env::var("CACHE_PREFIX").unwrap_or(defaults.cache_prefix),
            default_ttl: parse_var("DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            sweep_interval: parse_var("SWEEP_INTERVAL").unwrap_or(defaults.sweep_interval),
            external_object_cache: flag_var("EXTERNAL_OBJECT_CACHE")
                .unwrap_or(defaults.external_object_cache),
            single_flight: flag_var("SINGLE_FLIGHT").unwrap_or(defaults.single_flight),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_prefix: "hestia".to_string(),
            default_ttl: 60,
            server_port: 3000,
            sweep_interval: 60,
            external_object_cache: false,
            single_flight: false,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn flag_var(name: &str) -> Option<bool> {
    env::var(name).ok().map(|v| parse_flag(&v))
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
