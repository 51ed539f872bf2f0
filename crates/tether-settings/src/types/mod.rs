//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` for the JSON settings
//! file. Each type implements [`Default`] with production default values and
//! is marked `#[serde(default)]`, so partial JSON is accepted.

mod api;
mod auth;
mod socket;

pub use api::*;
pub use auth::*;
pub use socket::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for a Tether client.
///
/// # JSON Format
///
/// ```json
/// {
///   "api": { "baseUrl": "https://api.example.com", "query": { "retry": 2 } },
///   "socket": { "url": "wss://push.example.com/ws", "heartbeatIntervalMs": 15000 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TetherSettings {
    /// Settings schema version.
    pub version: String,
    /// HTTP API, cache and query defaults.
    pub api: ApiSettings,
    /// Token authority settings.
    pub auth: AuthSettings,
    /// WebSocket session settings.
    pub socket: SocketSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for TetherSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            api: ApiSettings::default(),
            auth: AuthSettings::default(),
            socket: SocketSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl TetherSettings {
    /// Reject combinations that would make the runtime misbehave.
    pub fn validate(&self) -> Result<()> {
        self.api.validate()?;
        self.socket.validate()?;
        if self.logging.level.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "logging.level must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `tracing` filter directive (e.g. `"warn"`, `"tether_socket=debug"`).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let settings: TetherSettings =
            serde_json::from_str(r#"{"api": {"query": {"retry": 1}}}"#).unwrap();
        assert_eq!(settings.api.query.retry, 1);
        assert_eq!(settings.api.cache_max_size, 100);
        assert_eq!(settings.socket.heartbeat_interval_ms, 30_000);
    }

    #[test]
    fn empty_log_level_is_invalid() {
        let mut settings = TetherSettings::default();
        settings.logging.level = "  ".to_string();
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(TetherSettings::default()).unwrap();
        assert!(json["api"]["cacheMaxSize"].is_number());
        assert!(json["socket"]["enableHeartCheck"].is_boolean());
    }
}
