//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use courier_shared::constants::{
    DEFAULT_HTTP_PORT, DEFAULT_WS_PORT, EMIT_INTERVAL_MAX_MS, EMIT_INTERVAL_MIN_MS,
    HEARTBEAT_INTERVAL_MS,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the REST API and `/metrics`.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:3000`
    pub http_addr: SocketAddr,

    /// Socket address the WebSocket endpoint listens on.
    /// Env: `WS_ADDR`
    /// Default: `0.0.0.0:9876`
    pub ws_addr: SocketAddr,

    /// Directory holding the database and the message key.
    /// Env: `DATA_DIR`
    /// Default: the platform data directory.
    pub data_dir: Option<PathBuf>,

    /// Lower bound of the delay between emitted messages.
    /// Env: `EMIT_INTERVAL_MIN_MS`
    pub emit_interval_min: Duration,

    /// Upper bound of the delay between emitted messages.
    /// Env: `EMIT_INTERVAL_MAX_MS`
    pub emit_interval_max: Duration,

    /// Period of the ping/liveness sweep.
    /// Env: `HEARTBEAT_INTERVAL_MS`
    pub heartbeat_interval: Duration,

    /// Seed demo data into an empty database at startup.
    /// Env: `SEED_ON_START` (true/false)
    /// Default: `true`
    pub seed_on_start: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            ws_addr: ([0, 0, 0, 0], DEFAULT_WS_PORT).into(),
            data_dir: None,
            emit_interval_min: Duration::from_millis(EMIT_INTERVAL_MIN_MS),
            emit_interval_max: Duration::from_millis(EMIT_INTERVAL_MAX_MS),
            heartbeat_interval: Duration::from_millis(HEARTBEAT_INTERVAL_MS),
            seed_on_start: true,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup. Invalid values are
    /// logged and replaced by the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = parse_var::<SocketAddr>(&lookup, "HTTP_ADDR") {
            config.http_addr = addr;
        }

        if let Some(addr) = parse_var::<SocketAddr>(&lookup, "WS_ADDR") {
            config.ws_addr = addr;
        }

        if let Some(path) = lookup("DATA_DIR").filter(|p| !p.is_empty()) {
            config.data_dir = Some(PathBuf::from(path));
        }

        if let Some(ms) = parse_var::<u64>(&lookup, "EMIT_INTERVAL_MIN_MS") {
            config.emit_interval_min = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_var::<u64>(&lookup, "EMIT_INTERVAL_MAX_MS") {
            config.emit_interval_max = Duration::from_millis(ms);
        }

        if config.emit_interval_max < config.emit_interval_min {
            tracing::warn!(
                min_ms = config.emit_interval_min.as_millis() as u64,
                max_ms = config.emit_interval_max.as_millis() as u64,
                "EMIT_INTERVAL_MAX_MS below EMIT_INTERVAL_MIN_MS, clamping"
            );
            config.emit_interval_max = config.emit_interval_min;
        }

        if let Some(ms) = parse_var::<u64>(&lookup, "HEARTBEAT_INTERVAL_MS") {
            if ms == 0 {
                tracing::warn!("HEARTBEAT_INTERVAL_MS must be positive, using default");
            } else {
                config.heartbeat_interval = Duration::from_millis(ms);
            }
        }

        if let Some(val) = lookup("SEED_ON_START") {
            config.seed_on_start = val != "false" && val != "0";
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}
