//! HTTP API, cache and query-default settings.

use serde::{Deserialize, Serialize};
use tether_core::BackoffConfig;

use crate::errors::{Result, SettingsError};

/// HTTP API settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiSettings {
    /// Base URL every endpoint is resolved against.
    pub base_url: String,
    /// Per-request timeout in milliseconds. `None` leaves requests unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
    /// Maximum number of cached responses.
    pub cache_max_size: usize,
    /// Interval of the background cache cleanup task in milliseconds.
    pub cleanup_interval_ms: u64,
    /// Response field whose non-empty value marks a business error.
    pub error_field: String,
    /// Default options applied to every query.
    pub query: QuerySettings,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            request_timeout_ms: None,
            cache_max_size: 100,
            cleanup_interval_ms: 60_000,
            error_field: "errorMessage".to_string(),
            query: QuerySettings::default(),
        }
    }
}

impl ApiSettings {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "api.baseUrl must not be empty".to_string(),
            ));
        }
        if self.cache_max_size == 0 {
            return Err(SettingsError::InvalidValue(
                "api.cacheMaxSize must be positive".to_string(),
            ));
        }
        if self.query.retry_delay.max_delay_ms < self.query.retry_delay.base_delay_ms {
            return Err(SettingsError::InvalidValue(
                "api.query.retryDelay.maxDelayMs must be >= baseDelayMs".to_string(),
            ));
        }
        Ok(())
    }
}

/// Default query behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuerySettings {
    /// How long a cached response counts as fresh, in milliseconds.
    pub stale_time_ms: u64,
    /// Hard expiry of cached responses, in milliseconds.
    pub cache_time_ms: u64,
    /// Number of retries after the first attempt.
    pub retry: u32,
    /// Exponential retry delay parameters.
    pub retry_delay: BackoffConfig,
    /// Whether queries run at all.
    pub enabled: bool,
    /// Treat a non-empty error field in a 2xx response as a failure.
    pub treat_error_message_as_error: bool,
    /// Write successful responses through to the cache.
    pub cache: bool,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            stale_time_ms: 0,
            cache_time_ms: 300_000,
            retry: 3,
            retry_delay: BackoffConfig::default(),
            enabled: true,
            treat_error_message_as_error: true,
            cache: true,
        }
    }
}
