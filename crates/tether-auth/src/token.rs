//! The bearer token value and its expiry.

use serde::{Deserialize, Serialize};

/// Values that some login flows persist in place of a real token.
const PLACEHOLDER_VALUES: &[&str] = &["null", "undefined"];

/// A bearer token and its absolute expiry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthToken {
    /// Opaque token string.
    pub value: String,
    /// Expiry in milliseconds since the Unix epoch.
    pub expires_at: i64,
}

impl AuthToken {
    /// Create a token.
    pub fn new(value: impl Into<String>, expires_at: i64) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// Whether the token can be sent as-is at time `now_ms`.
    ///
    /// Requires a non-empty, non-placeholder value and an expiry strictly in
    /// the future.
    pub fn is_usable(&self, now_ms: i64) -> bool {
        let value = self.value.trim();
        !value.is_empty() && !PLACEHOLDER_VALUES.contains(&value) && self.expires_at > now_ms
    }
}
