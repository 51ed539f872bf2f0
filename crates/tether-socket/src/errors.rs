//! Socket error types.

use tokio_tungstenite::tungstenite;

/// Errors surfaced by [`SocketSession`](crate::SocketSession).
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// Missing URL, message callback or identity field. Never retried.
    #[error("socket configuration error: {0}")]
    Config(String),

    /// The session was destroyed and cannot connect again.
    #[error("socket session destroyed")]
    Destroyed,

    /// The opening handshake did not finish in time.
    #[error("socket connect timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured connect timeout.
        timeout_ms: u64,
    },

    /// WebSocket protocol or transport failure.
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),

    /// Frame serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The session task stopped before reporting the first attempt.
    #[error("socket session task ended")]
    TaskEnded,
}

impl From<tungstenite::Error> for SocketError {
    fn from(err: tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

impl SocketError {
    /// Whether a reconnect could succeed after this error.
    ///
    /// Malformed request URLs and missing TLS support fail the same way on
    /// every attempt, so they stop the reconnect loop.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::WebSocket(err) => !matches!(
                **err,
                tungstenite::Error::Url(_) | tungstenite::Error::HttpFormat(_)
            ),
            _ => false,
        }
    }

    /// Error category string for logs and snapshots.
    pub fn category(&self) -> &str {
        match self {
            Self::Config(_) => "config",
            Self::Destroyed | Self::TaskEnded => "lifecycle",
            Self::Timeout { .. } => "timeout",
            Self::WebSocket(_) => "websocket",
            Self::Json(_) => "parse",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
