//! Session configuration and URL construction.

use std::time::Duration;

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use tether_settings::SocketSettings;

use crate::errors::SocketError;

/// Who the client is, sent as URL parameters and in the login frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SocketIdentity {
    /// Client installation key. Required.
    pub client_key: String,
    /// Client IP as seen by the application.
    pub ip: String,
    /// Role of the member.
    pub role: String,
    /// Display name.
    pub name: String,
    /// Member id. Required.
    pub member_id: String,
    /// Subscribe to alarm notifications.
    pub notify_alarm: bool,
    /// Subscribe to message notifications.
    pub notify_message: bool,
    /// Optional id echoed by the server for request tracing.
    pub correlation_id: Option<String>,
}

impl SocketIdentity {
    /// Identity with the two required fields.
    pub fn new(client_key: impl Into<String>, member_id: impl Into<String>) -> Self {
        Self {
            client_key: client_key.into(),
            member_id: member_id.into(),
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), SocketError> {
        if self.client_key.trim().is_empty() {
            return Err(SocketError::Config("identity.clientKey is required".to_string()));
        }
        if self.member_id.trim().is_empty() {
            return Err(SocketError::Config("identity.memberId is required".to_string()));
        }
        Ok(())
    }

    /// Query parameters in wire order.
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("clientKey", self.client_key.clone()),
            ("ip", self.ip.clone()),
            ("role", self.role.clone()),
            ("name", self.name.clone()),
            ("memberId", self.member_id.clone()),
            ("notifyAlarm", self.notify_alarm.to_string()),
            ("notifyMessage", self.notify_message.to_string()),
        ];
        if let Some(id) = &self.correlation_id {
            params.push(("correlationId", id.clone()));
        }
        params
    }
}

/// Everything a [`SocketSession`](crate::SocketSession) needs to run.
#[derive(Clone, Debug)]
pub struct SocketConfig {
    /// `ws://` or `wss://` endpoint without identity parameters.
    pub url: String,
    /// Identity sent on every connect.
    pub identity: SocketIdentity,
    /// Send pings and watch for replies.
    pub enable_heart_check: bool,
    /// Idle time before a ping.
    pub heartbeat_interval: Duration,
    /// Time allowed for any frame after a ping.
    pub heartbeat_timeout: Duration,
    /// Automatic reconnects before giving up.
    pub max_reconnect_attempts: u32,
    /// Delay before the first reconnect.
    pub initial_reconnect_delay: Duration,
    /// Cap on the reconnect delay.
    pub max_reconnect_delay: Duration,
    /// Cap on the opening handshake.
    pub connect_timeout: Option<Duration>,
}

impl SocketConfig {
    /// Config with default timings.
    pub fn new(url: impl Into<String>, identity: SocketIdentity) -> Self {
        Self {
            url: url.into(),
            ..Self::from_settings(&SocketSettings::default(), identity)
        }
    }

    /// Config from loaded settings.
    pub fn from_settings(settings: &SocketSettings, identity: SocketIdentity) -> Self {
        Self {
            url: settings.url.clone(),
            identity,
            enable_heart_check: settings.enable_heart_check,
            heartbeat_interval: Duration::from_millis(settings.heartbeat_interval_ms),
            heartbeat_timeout: Duration::from_millis(settings.heartbeat_timeout_ms),
            max_reconnect_attempts: settings.max_reconnect_attempts,
            initial_reconnect_delay: Duration::from_millis(settings.initial_reconnect_delay_ms),
            max_reconnect_delay: Duration::from_millis(settings.max_reconnect_delay_ms),
            connect_timeout: settings.connect_timeout_ms.map(Duration::from_millis),
        }
    }

    /// Reject configs the session cannot run with.
    pub fn validate(&self) -> Result<(), SocketError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(SocketError::Config("socket url is required".to_string()));
        }
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(SocketError::Config(format!(
                "socket url must use ws:// or wss://, got {url}"
            )));
        }
        if self.enable_heart_check
            && (self.heartbeat_interval.is_zero() || self.heartbeat_timeout.is_zero())
        {
            return Err(SocketError::Config(
                "heartbeat interval and timeout must be positive".to_string(),
            ));
        }
        self.identity.validate()
    }

    /// Endpoint with percent-encoded identity parameters appended.
    pub fn connect_url(&self) -> String {
        let query = self
            .identity
            .params()
            .into_iter()
            .map(|(key, value)| format!("{key}={}", utf8_percent_encode(&value, NON_ALPHANUMERIC)))
            .collect::<Vec<_>>()
            .join("&");
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{separator}{query}", self.url.trim())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
