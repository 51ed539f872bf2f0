//! # tether-settings
//!
//! Configuration management with layered sources for Tether clients.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`TetherSettings::default()`]
//! 2. **User file**: `~/.tether/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `TETHER_*` overrides (highest priority)
//!
//! There is no global instance: each `ApiClient` / `SocketSession` is built
//! from the settings value its owner loaded.
//!
//! # Usage
//!
//! ```no_run
//! use tether_settings::load_settings;
//!
//! let settings = load_settings().unwrap_or_default();
//! println!("API base URL: {}", settings.api.base_url);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = TetherSettings::default();
        let _path = settings_path();
    }

    #[test]
    fn default_settings_are_valid() {
        let settings = TetherSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.version, "0.1.0");
        assert_eq!(settings.api.cache_max_size, 100);
        assert_eq!(settings.api.query.retry, 3);
        assert!(settings.api.query.treat_error_message_as_error);
        assert!(settings.socket.enable_heart_check);
        assert_eq!(settings.socket.max_reconnect_attempts, 10);
        assert_eq!(settings.logging.level, "warn");
    }
}
