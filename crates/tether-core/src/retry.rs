//! Backoff configuration and delay calculation.
//!
//! Provides the portable, sync-only building blocks for retry logic. The
//! async loops live with their callers (`tether-query` for HTTP retries,
//! `tether-socket` for reconnects); both compute delays here so the two
//! schedules cannot drift apart:
//!
//! - [`BackoffConfig`]: base delay and cap
//! - [`calculate_backoff_delay`]: `min(base * 2^attempt, cap)`

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Exponential backoff parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffConfig {
    /// Delay before the first retry in ms (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound for any single delay in ms (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl BackoffConfig {
    /// Create a config from explicit durations.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base_delay_ms: base.as_millis() as u64,
            max_delay_ms: max.as_millis() as u64,
        }
    }

    /// Delay for the zero-based `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(calculate_backoff_delay(
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
        ))
    }

    /// The full delay sequence for attempts `0..count`.
    pub fn schedule(&self, count: u32) -> Vec<Duration> {
        (0..count).map(|attempt| self.delay(attempt)).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Calculate an exponential backoff delay.
///
/// Formula: `min(max_delay, base_delay * 2^attempt)`
///
/// # Arguments
///
/// * `attempt`: zero-based attempt index (0 for the first retry)
/// * `base_delay_ms`: base delay in milliseconds
/// * `max_delay_ms`: maximum delay cap
#[must_use]
pub fn calculate_backoff_delay(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    exponential.min(max_delay_ms)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // -- BackoffConfig --

    #[test]
    fn backoff_config_defaults() {
        let config = BackoffConfig::default();
        assert_eq!(config.base_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 30_000);
    }

    #[test]
    fn backoff_config_serde_defaults() {
        let config: BackoffConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, BackoffConfig::default());
    }

    #[test]
    fn backoff_config_camel_case() {
        let config: BackoffConfig =
            serde_json::from_str(r#"{"baseDelayMs": 250, "maxDelayMs": 4000}"#).unwrap();
        assert_eq!(config.base_delay_ms, 250);
        assert_eq!(config.max_delay_ms, 4000);
    }

    #[test]
    fn backoff_config_from_durations() {
        let config = BackoffConfig::new(Duration::from_millis(100), Duration::from_secs(2));
        assert_eq!(config.delay(0), Duration::from_millis(100));
        assert_eq!(config.delay(5), Duration::from_secs(2));
    }

    #[test]
    fn schedule_matches_formula() {
        let config = BackoffConfig::new(Duration::from_millis(500), Duration::from_millis(3000));
        let delays: Vec<u64> = config
            .schedule(6)
            .into_iter()
            .map(|d| u64::try_from(d.as_millis()).unwrap())
            .collect();
        assert_eq!(delays, vec![500, 1000, 2000, 3000, 3000, 3000]);
    }

    // -- calculate_backoff_delay --

    #[test]
    fn backoff_exponential_growth() {
        assert_eq!(calculate_backoff_delay(0, 1000, 60_000), 1000);
        assert_eq!(calculate_backoff_delay(1, 1000, 60_000), 2000);
        assert_eq!(calculate_backoff_delay(2, 1000, 60_000), 4000);
        assert_eq!(calculate_backoff_delay(3, 1000, 60_000), 8000);
    }

    #[test]
    fn backoff_caps_at_max() {
        assert_eq!(calculate_backoff_delay(10, 1000, 60_000), 60_000);
    }

    #[test]
    fn backoff_high_attempt_no_overflow() {
        assert_eq!(calculate_backoff_delay(100, 1000, 60_000), 60_000);
        assert_eq!(calculate_backoff_delay(63, u64::MAX / 2, u64::MAX), u64::MAX);
    }

    #[test]
    fn backoff_zero_base_stays_zero() {
        assert_eq!(calculate_backoff_delay(4, 0, 60_000), 0);
    }
}
