//! Serializable error snapshots.
//!
//! Error enums live in the crate that raises them. What crosses into
//! subscriber callbacks and state snapshots is [`ErrorInfo`]: cloneable,
//! comparable and serializable, which the source enums are not.

use serde::{Deserialize, Serialize};

/// Snapshot of a failure as seen by observers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    /// Error category (`"api_error"`, `"transport"`, `"network"`, ...).
    pub category: String,
    /// Human-readable message.
    pub message: String,
    /// HTTP status, when the failure came from a response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Whether the operation that produced this error may be retried.
    pub retryable: bool,
}

impl ErrorInfo {
    /// Create a snapshot without an HTTP status.
    pub fn new(category: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            category: category.into(),
            message: message.into(),
            status: None,
            retryable,
        }
    }

    /// Attach an HTTP status.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({status}): {}", self.category, self.message),
            None => write!(f, "{}: {}", self.category, self.message),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
