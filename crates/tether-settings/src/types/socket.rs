//! WebSocket session settings.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Connection, heartbeat and reconnect settings for a socket session.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SocketSettings {
    /// `ws://` or `wss://` endpoint, without identity query parameters.
    pub url: String,
    /// Send ping frames and watch for replies.
    pub enable_heart_check: bool,
    /// Idle time before a ping is sent, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Time allowed for any frame to arrive after a ping, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Automatic reconnects allowed before giving up.
    pub max_reconnect_attempts: u32,
    /// Delay before the first reconnect, in milliseconds.
    pub initial_reconnect_delay_ms: u64,
    /// Upper bound for the reconnect delay, in milliseconds.
    pub max_reconnect_delay_ms: u64,
    /// Timeout for the opening handshake, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
}

impl Default for SocketSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            enable_heart_check: true,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 10_000,
            max_reconnect_attempts: 10,
            initial_reconnect_delay_ms: 1000,
            max_reconnect_delay_ms: 30_000,
            connect_timeout_ms: Some(10_000),
        }
    }
}

impl SocketSettings {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.enable_heart_check
            && (self.heartbeat_interval_ms == 0 || self.heartbeat_timeout_ms == 0)
        {
            return Err(SettingsError::InvalidValue(
                "socket heartbeat interval and timeout must be positive".to_string(),
            ));
        }
        if self.max_reconnect_delay_ms < self.initial_reconnect_delay_ms {
            return Err(SettingsError::InvalidValue(
                "socket.maxReconnectDelayMs must be >= initialReconnectDelayMs".to_string(),
            ));
        }
        Ok(())
    }
}
