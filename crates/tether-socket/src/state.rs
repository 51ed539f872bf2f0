//! Connection state and the read-only snapshot.

use std::time::Duration;

use serde::Serialize;

/// Lifecycle state of a socket session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SocketState {
    /// No connection and no reconnect pending.
    #[default]
    Disconnected,
    /// Opening handshake in progress.
    Connecting,
    /// Open and logged in.
    Connected,
    /// Graceful close in progress.
    Disconnecting,
    /// The connection failed; a reconnect may be pending.
    Error,
}

impl std::fmt::Display for SocketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Read-only view of a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketSnapshot {
    /// Current state.
    pub state: SocketState,
    /// Reconnects attempted since the last successful open.
    pub reconnect_attempts: u32,
    /// Delay of the latest scheduled reconnect.
    pub current_backoff_delay: Duration,
    /// Whether the heartbeat is running on the current connection.
    pub heartbeat_armed: bool,
    /// Whether the session was destroyed.
    pub destroyed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_display_and_serde_agree() {
        for state in [
            SocketState::Disconnected,
            SocketState::Connecting,
            SocketState::Connected,
            SocketState::Disconnecting,
            SocketState::Error,
        ] {
            let json = serde_json::to_value(state).unwrap();
            assert_eq!(json, state.to_string());
        }
    }
}
