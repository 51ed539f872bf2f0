//! Auth error types.

/// Errors that can occur during authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// HTTP request to the token endpoint failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Session store I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The token endpoint refused to issue a token.
    #[error(transparent)]
    Refresh(#[from] RefreshFailure),

    /// Credentials required for a refresh are missing.
    #[error("auth not configured: {0}")]
    NotConfigured(String),
}

impl AuthError {
    /// Error category string for logs and snapshots.
    pub fn category(&self) -> &str {
        match self {
            Self::Http(_) => "network",
            Self::Json(_) => "parse",
            Self::Io(_) => "storage",
            Self::Refresh(_) => "auth",
            Self::NotConfigured(_) => "config",
        }
    }
}

/// Outcome of a failed refresh, shared by every caller that awaited it.
///
/// Unlike [`AuthError`] this is `Clone`, which the single-flight refresh
/// needs to hand the same failure to all waiters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("token refresh failed ({status}): {message}")]
pub struct RefreshFailure {
    /// HTTP status code (0 if no response).
    pub status: u16,
    /// Error description.
    pub message: String,
}

impl From<&AuthError> for RefreshFailure {
    fn from(err: &AuthError) -> Self {
        match err {
            AuthError::Refresh(failure) => failure.clone(),
            AuthError::Http(e) => Self {
                status: e.status().map_or(0, |s| s.as_u16()),
                message: e.to_string(),
            },
            other => Self {
                status: 0,
                message: other.to_string(),
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_failure_display() {
        let err = AuthError::from(RefreshFailure {
            status: 401,
            message: "bad credentials".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "token refresh failed (401): bad credentials"
        );
        assert_eq!(err.category(), "auth");
    }

    #[test]
    fn not_configured_display() {
        let err = AuthError::NotConfigured("account is empty".to_string());
        assert_eq!(err.to_string(), "auth not configured: account is empty");
    }

    #[test]
    fn io_error_becomes_status_zero_failure() {
        let err = AuthError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let failure = RefreshFailure::from(&err);
        assert_eq!(failure.status, 0);
        assert!(failure.message.contains("denied"));
    }

    #[test]
    fn refresh_failure_round_trips() {
        let original = RefreshFailure {
            status: 503,
            message: "down".to_string(),
        };
        let err = AuthError::from(original.clone());
        assert_eq!(RefreshFailure::from(&err), original);
    }
}
