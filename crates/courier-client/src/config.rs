//! Client configuration.

use std::time::Duration;

use courier_shared::constants::{
    DEFAULT_WS_PORT, HEARTBEAT_INTERVAL_MS, HEARTBEAT_TIMEOUT_MS, RECONNECT_BASE_DELAY_MS,
    RECONNECT_MAX_DELAY_MS, RECONNECT_MAX_RETRIES,
};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the server.
    pub url: String,
    /// How often the client pings the server.
    pub heartbeat_interval: Duration,
    /// Silence after which the link is presumed dead.
    pub heartbeat_timeout: Duration,
    /// First reconnect delay; doubles per attempt.
    pub reconnect_base_delay: Duration,
    /// Cap on the reconnect delay.
    pub reconnect_max_delay: Duration,
    /// Failed attempts tolerated before going offline for good.
    pub max_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: format!("ws://localhost:{DEFAULT_WS_PORT}"),
            heartbeat_interval: Duration::from_millis(HEARTBEAT_INTERVAL_MS),
            heartbeat_timeout: Duration::from_millis(HEARTBEAT_TIMEOUT_MS),
            reconnect_base_delay: Duration::from_millis(RECONNECT_BASE_DELAY_MS),
            reconnect_max_delay: Duration::from_millis(RECONNECT_MAX_DELAY_MS),
            max_retries: RECONNECT_MAX_RETRIES,
        }
    }
}

impl ClientConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}
