//! Per-query behavior knobs.

use std::sync::Arc;
use std::time::Duration;

use tether_core::BackoffConfig;
use tether_settings::QuerySettings;

/// Delay before retry `i` (0-based).
#[derive(Clone)]
pub enum RetryDelay {
    /// `min(base * 2^i, cap)`.
    Exponential(BackoffConfig),
    /// Caller-supplied schedule.
    Custom(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl RetryDelay {
    /// Wrap a closure as a custom schedule.
    pub fn custom(f: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    /// Delay before retry `retry_index`.
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        match self {
            Self::Exponential(config) => config.delay(retry_index),
            Self::Custom(f) => f(retry_index),
        }
    }
}

impl Default for RetryDelay {
    fn default() -> Self {
        Self::Exponential(BackoffConfig::default())
    }
}

impl std::fmt::Debug for RetryDelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exponential(config) => f.debug_tuple("Exponential").field(config).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// How one query is cached, retried and gated.
#[derive(Clone, Debug)]
pub struct QueryOptions {
    /// Cached payloads younger than this are served without a request.
    pub stale_time: Duration,
    /// Cached payloads older than this are dropped on eviction.
    pub cache_time: Duration,
    /// Retries after the first attempt.
    pub retry: u32,
    /// Delay schedule between attempts.
    pub retry_delay: RetryDelay,
    /// When `false`, queries return the last payload without a request.
    pub enabled: bool,
    /// Treat a non-empty error field in a 2xx body as a failure.
    pub treat_error_message_as_error: bool,
    /// Read from and write through to the cache.
    pub cache: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::from(&QuerySettings::default())
    }
}

impl From<&QuerySettings> for QueryOptions {
    fn from(settings: &QuerySettings) -> Self {
        Self {
            stale_time: Duration::from_millis(settings.stale_time_ms),
            cache_time: Duration::from_millis(settings.cache_time_ms),
            retry: settings.retry,
            retry_delay: RetryDelay::Exponential(settings.retry_delay),
            enabled: settings.enabled,
            treat_error_message_as_error: settings.treat_error_message_as_error,
            cache: settings.cache,
        }
    }
}

impl QueryOptions {
    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.retry.saturating_add(1)
    }

    /// Copy with `retry` retries.
    #[must_use]
    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    /// Copy with a retry delay schedule.
    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: RetryDelay) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Copy with a stale time.
    #[must_use]
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }
}
