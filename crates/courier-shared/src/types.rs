use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Health of the client's link to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Reconnecting,
    #[default]
    Offline,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Offline => "offline",
        }
    }

    /// Value exported on the connection-state gauge (1, 0.5, 0).
    pub fn gauge_value(&self) -> f64 {
        match self {
            Self::Connected => 1.0,
            Self::Reconnecting => 0.5,
            Self::Offline => 0.0,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current time as Unix milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_wire_names() {
        assert_eq!(serde_json::to_string(&ConnectionState::Connected).unwrap(), "\"connected\"");
        assert_eq!(
            serde_json::from_str::<ConnectionState>("\"reconnecting\"").unwrap(),
            ConnectionState::Reconnecting
        );
        assert_eq!(ConnectionState::default(), ConnectionState::Offline);
    }
}
