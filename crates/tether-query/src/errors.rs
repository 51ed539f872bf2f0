//! Request and query-state error types.

use serde_json::Value;
use tether_core::ErrorInfo;

use crate::state::QueryStatus;

/// Error code carried by business errors.
pub const API_ERROR_CODE: &str = "api_error";

/// Outcome of a failed request.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The request could not be built (missing endpoint, bad header, ...).
    /// Never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// The server answered 2xx but flagged the payload as an error.
    #[error("{code}: {message}")]
    Business {
        /// Error code, [`API_ERROR_CODE`] for error-field responses.
        code: String,
        /// Value of the error field.
        message: String,
        /// The full response body.
        payload: Value,
    },

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {message}")]
    Transport {
        /// HTTP status code.
        status: u16,
        /// Response body, or the canonical reason when the body is empty.
        message: String,
    },

    /// No response arrived (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Request body serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The query is disabled and has no previous payload.
    #[error("query is disabled")]
    Disabled,
}

impl RequestError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Network(_))
    }

    /// Whether the server rejected our credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Transport { status: 401, .. })
    }

    /// HTTP status, when the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Error category string for logs and snapshots.
    pub fn category(&self) -> &str {
        match self {
            Self::Config(_) => "config",
            Self::Business { .. } => API_ERROR_CODE,
            Self::Transport { .. } => "transport",
            Self::Network(_) => "network",
            Self::Json(_) => "parse",
            Self::Disabled => "disabled",
        }
    }

    /// Serializable snapshot for observers.
    pub fn to_info(&self) -> ErrorInfo {
        let message = match self {
            Self::Business { message, .. } | Self::Transport { message, .. } => message.clone(),
            other => other.to_string(),
        };
        let info = ErrorInfo::new(self.category(), message, self.is_retryable());
        match self.status() {
            Some(status) => info.with_status(status),
            None => info,
        }
    }
}

/// Query state machine violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// `success` and `error` are reachable only from `loading`; `idle` only
    /// through `reset`.
    #[error("invalid query transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Status before the attempted update.
        from: QueryStatus,
        /// Requested status.
        to: QueryStatus,
    },
}

impl QueryError {
    /// Error category string.
    pub fn category(&self) -> &str {
        match self {
            Self::InvalidTransition { .. } => "state",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn business() -> RequestError {
        RequestError::Business {
            code: API_ERROR_CODE.to_string(),
            message: "quota exceeded".to_string(),
            payload: serde_json::json!({"errorMessage": "quota exceeded"}),
        }
    }

    #[test]
    fn retryability() {
        assert!(
            RequestError::Transport {
                status: 500,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(!business().is_retryable());
        assert!(!RequestError::Config("no endpoint".into()).is_retryable());
        assert!(!RequestError::Disabled.is_retryable());
    }

    #[test]
    fn unauthorized_is_auth_failure_and_retryable() {
        let err = RequestError::Transport {
            status: 401,
            message: "Unauthorized".into(),
        };
        assert!(err.is_auth_failure());
        assert!(err.is_retryable());
    }

    #[test]
    fn business_info_carries_message() {
        let info = business().to_info();
        assert_eq!(info.category, "api_error");
        assert_eq!(info.message, "quota exceeded");
        assert!(!info.retryable);
        assert!(info.status.is_none());
    }

    #[test]
    fn transport_info_carries_status() {
        let info = RequestError::Transport {
            status: 503,
            message: "down".into(),
        }
        .to_info();
        assert_eq!(info.status, Some(503));
        assert!(info.retryable);
    }

    #[test]
    fn invalid_transition_display() {
        let err = QueryError::InvalidTransition {
            from: QueryStatus::Idle,
            to: QueryStatus::Success,
        };
        assert_eq!(err.to_string(), "invalid query transition: Idle -> Success");
        assert_eq!(err.category(), "state");
    }
}
