//! The network call that issues a token.

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::{AuthError, RefreshFailure};
use crate::token::AuthToken;

/// Lifetime assumed when the token endpoint reports no expiry, in seconds.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Issues a fresh token.
///
/// The authority calls this at most once at a time; implementations do not
/// need their own deduplication.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Obtain a new token.
    async fn refresh(&self) -> Result<AuthToken, AuthError>;
}

/// Body returned by the token endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TokenResponse {
    token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    error_message: Option<String>,
}

/// Posts `{account, secret}` to the token endpoint.
#[derive(Clone)]
pub struct HttpTokenRefresher {
    client: reqwest::Client,
    token_url: String,
    account: String,
    secret: String,
    expiry_buffer_secs: i64,
}

impl std::fmt::Debug for HttpTokenRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTokenRefresher")
            .field("token_url", &self.token_url)
            .field("account", &self.account)
            .field("secret", &"***")
            .finish_non_exhaustive()
    }
}

impl HttpTokenRefresher {
    /// Create a refresher for `token_url`.
    pub fn new(
        client: reqwest::Client,
        token_url: impl Into<String>,
        account: impl Into<String>,
        secret: impl Into<String>,
        expiry_buffer_secs: i64,
    ) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            account: account.into(),
            secret: secret.into(),
            expiry_buffer_secs,
        }
    }

    /// Absolute expiry for a response, preferring an explicit `expiresAt`.
    fn expiry_for(&self, data: &TokenResponse) -> i64 {
        if let Some(at) = data.expires_at {
            return at - self.expiry_buffer_secs * 1000;
        }
        let lifetime = data.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        tether_core::time::expires_at_from_now(lifetime, self.expiry_buffer_secs)
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    #[tracing::instrument(skip_all, fields(url = %self.token_url))]
    async fn refresh(&self) -> Result<AuthToken, AuthError> {
        if self.account.is_empty() {
            return Err(AuthError::NotConfigured("account is empty".to_string()));
        }

        let body = serde_json::json!({
            "account": self.account,
            "secret": self.secret,
        });

        let resp = self.client.post(&self.token_url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RefreshFailure {
                status: status.as_u16(),
                message: text,
            }
            .into());
        }

        let text = resp.text().await?;
        let data: TokenResponse = serde_json::from_str(&text)?;

        if let Some(message) = data.error_message.as_deref().filter(|m| !m.is_empty()) {
            return Err(RefreshFailure {
                status: status.as_u16(),
                message: message.to_string(),
            }
            .into());
        }

        let Some(value) = data.token.clone().filter(|t| !t.is_empty()) else {
            return Err(RefreshFailure {
                status: status.as_u16(),
                message: "response carried no token".to_string(),
            }
            .into());
        };

        Ok(AuthToken::new(value, self.expiry_for(&data)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
