//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TetherSettings::default()`]
//! 2. If `~/.tether/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::TetherSettings;

/// Resolve the path to the settings file (`~/.tether/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tether").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TetherSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON or the merged values fail validation, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<TetherSettings> {
    let defaults = serde_json::to_value(TetherSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: TetherSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Each env var has strict parsing rules:
/// - Integers must be valid and within the specified range
/// - Booleans accept: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Invalid values are ignored with a warning (fall back to file/default)
pub fn apply_env_overrides(settings: &mut TetherSettings) {
    // ── API settings ────────────────────────────────────────────────
    if let Some(v) = read_env_string("TETHER_API_BASE_URL") {
        settings.api.base_url = v;
    }
    if let Some(v) = read_env_u64("TETHER_REQUEST_TIMEOUT_MS", 1, 3_600_000) {
        settings.api.request_timeout_ms = Some(v);
    }
    if let Some(v) = read_env_usize("TETHER_CACHE_MAX_SIZE", 1, 1_000_000) {
        settings.api.cache_max_size = v;
    }
    if let Some(v) = read_env_u64("TETHER_STALE_TIME_MS", 0, 86_400_000) {
        settings.api.query.stale_time_ms = v;
    }
    if let Some(v) = read_env_u64("TETHER_CACHE_TIME_MS", 0, 86_400_000) {
        settings.api.query.cache_time_ms = v;
    }
    if let Some(v) = read_env_u32("TETHER_RETRY", 0, 100) {
        settings.api.query.retry = v;
    }

    // ── Auth settings ───────────────────────────────────────────────
    if let Some(v) = read_env_string("TETHER_AUTH_ACCOUNT") {
        settings.auth.account = v;
    }
    if let Some(v) = read_env_string("TETHER_AUTH_SECRET") {
        settings.auth.secret = v;
    }
    if let Some(v) = read_env_string("TETHER_SESSION_FILE") {
        settings.auth.session_file = Some(v);
    }

    // ── Socket settings ─────────────────────────────────────────────
    if let Some(v) = read_env_string("TETHER_WS_URL") {
        settings.socket.url = v;
    }
    if let Some(v) = read_env_bool("TETHER_HEART_CHECK") {
        settings.socket.enable_heart_check = v;
    }
    if let Some(v) = read_env_u64("TETHER_HEARTBEAT_INTERVAL_MS", 100, 600_000) {
        settings.socket.heartbeat_interval_ms = v;
    }
    if let Some(v) = read_env_u64("TETHER_HEARTBEAT_TIMEOUT_MS", 100, 600_000) {
        settings.socket.heartbeat_timeout_ms = v;
    }
    if let Some(v) = read_env_u32("TETHER_MAX_RECONNECT_ATTEMPTS", 0, 10_000) {
        settings.socket.max_reconnect_attempts = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("TETHER_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    let val = std::env::var(name).ok()?;
    let result = parse_u32_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_objects() {
        let target = serde_json::json!({"api": {"baseUrl": "a", "cacheMaxSize": 100}});
        let source = serde_json::json!({"api": {"baseUrl": "b"}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["api"]["baseUrl"], "b");
        assert_eq!(merged["api"]["cacheMaxSize"], 100);
    }

    #[test]
    fn merge_null_source_preserves_target() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_arrays_replace() {
        let target = serde_json::json!({"list": [1, 2, 3]});
        let source = serde_json::json!({"list": [9]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["list"], serde_json::json!([9]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 42);
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_accepts_common_forms() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u32_range("3", 0, 10), Some(3));
        assert_eq!(parse_u32_range("11", 0, 10), None);
        assert_eq!(parse_u64_range("-1", 0, 10), None);
        assert_eq!(parse_usize_range("100", 1, 100), Some(100));
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let path = Path::new("/nonexistent/settings.json");
        let settings = load_settings_from_path(path).unwrap();
        let defaults = TetherSettings::default();
        assert_eq!(settings.version, defaults.version);
        assert_eq!(settings.api.cache_max_size, defaults.api.cache_max_size);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"socket": {"heartbeatIntervalMs": 5000}, "api": {"query": {"staleTimeMs": 1500}}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.socket.heartbeat_interval_ms, 5000);
        assert_eq!(settings.socket.heartbeat_timeout_ms, 10_000);
        assert_eq!(settings.api.query.stale_time_ms, 1500);
        assert_eq!(settings.api.query.retry, 3);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    #[test]
    fn load_invalid_values_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"api": {"cacheMaxSize": 0}}"#).unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::InvalidValue(_)));
    }
}
