//! Application frames.
//!
//! Frames are JSON objects whose kind is named by a `type` field, or by
//! `TypeCode` on older servers. `login`, `ping`, `pong` and `error` are
//! reserved; everything else is delivered to the message callback.

use serde::Serialize;
use serde_json::{Value, json};

use crate::config::SocketIdentity;

/// Reserved and application frame kinds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// Login acknowledgement or echo.
    Login,
    /// Liveness check; answered with a pong.
    Ping,
    /// Liveness reply; consumed by the heartbeat.
    Pong,
    /// Server-reported error.
    Error,
    /// Any other discriminator.
    Other(String),
    /// Not a JSON object, or no discriminator.
    Untyped,
}

impl FrameKind {
    fn from_discriminator(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "login" => Self::Login,
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            "error" => Self::Error,
            _ => Self::Other(value.to_string()),
        }
    }
}

/// One inbound text frame.
#[derive(Clone, Debug, PartialEq)]
pub struct SocketMessage {
    /// Raw frame text.
    pub text: String,
    /// Parsed JSON, when the text is JSON.
    pub json: Option<Value>,
    /// Frame kind.
    pub kind: FrameKind,
}

impl SocketMessage {
    /// Parse and classify a text frame.
    pub fn parse(text: impl Into<String>) -> Self {
        let text = text.into();
        let json = serde_json::from_str::<Value>(&text).ok();
        let kind = json
            .as_ref()
            .and_then(|v| v.get("type").or_else(|| v.get("TypeCode")))
            .map_or(FrameKind::Untyped, |d| match d {
                Value::String(s) => FrameKind::from_discriminator(s),
                other => FrameKind::from_discriminator(&other.to_string()),
            });
        Self { text, json, kind }
    }
}

/// Login frame sent right after every successful open.
pub fn login_frame(identity: &SocketIdentity) -> String {
    let mut frame = json!({
        "type": "login",
        "clientKey": identity.client_key,
        "ip": identity.ip,
        "role": identity.role,
        "name": identity.name,
        "memberId": identity.member_id,
        "notifyAlarm": identity.notify_alarm,
        "notifyMessage": identity.notify_message,
        "timestamp": tether_core::now_ms(),
    });
    if let Some(id) = &identity.correlation_id {
        frame["correlationId"] = Value::String(id.clone());
    }
    frame.to_string()
}

/// Heartbeat ping frame.
pub fn ping_frame() -> String {
    json!({"type": "ping", "timestamp": tether_core::now_ms()}).to_string()
}

/// Reply to an inbound ping.
pub fn pong_frame() -> String {
    json!({"type": "pong", "timestamp": tether_core::now_ms()}).to_string()
}

/// Encode an outbound message: strings pass through, anything else is
/// JSON-encoded.
pub fn encode<T: Serialize + ?Sized>(message: &T) -> Result<String, serde_json::Error> {
    Ok(match serde_json::to_value(message)? {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_type_and_type_code() {
        assert_eq!(SocketMessage::parse(r#"{"type":"pong"}"#).kind, FrameKind::Pong);
        assert_eq!(SocketMessage::parse(r#"{"TypeCode":"PING"}"#).kind, FrameKind::Ping);
        assert_eq!(SocketMessage::parse(r#"{"type":"error","msg":"x"}"#).kind, FrameKind::Error);
        assert_eq!(
            SocketMessage::parse(r#"{"type":"alarm"}"#).kind,
            FrameKind::Other("alarm".into())
        );
        assert_eq!(SocketMessage::parse(r#"{"TypeCode":7}"#).kind, FrameKind::Other("7".into()));
    }

    #[test]
    fn non_json_is_untyped() {
        let msg = SocketMessage::parse("hello");
        assert_eq!(msg.kind, FrameKind::Untyped);
        assert!(msg.json.is_none());
        assert_eq!(SocketMessage::parse("[1,2]").kind, FrameKind::Untyped);
    }

    #[test]
    fn login_frame_carries_identity() {
        let mut identity = SocketIdentity::new("key", "7");
        identity.ip = "10.0.0.1".into();
        identity.role = "admin".into();
        identity.name = "Zoë".into();
        identity.notify_alarm = true;
        identity.correlation_id = Some("c-1".into());
        let frame: Value = serde_json::from_str(&login_frame(&identity)).unwrap();
        assert_eq!(frame["type"], "login");
        assert_eq!(frame["clientKey"], "key");
        assert_eq!(frame["ip"], "10.0.0.1");
        assert_eq!(frame["role"], "admin");
        assert_eq!(frame["name"], "Zoë");
        assert_eq!(frame["memberId"], "7");
        assert_eq!(frame["notifyAlarm"], true);
        assert_eq!(frame["notifyMessage"], false);
        assert_eq!(frame["correlationId"], "c-1");
    }

    #[test]
    fn encode_passes_strings_through() {
        assert_eq!(encode("raw text").unwrap(), "raw text");
        assert_eq!(encode(&json!({"a": 1})).unwrap(), r#"{"a":1}"#);
        assert_eq!(encode(&vec![1, 2]).unwrap(), "[1,2]");
    }

    #[test]
    fn heartbeat_frames_are_typed() {
        assert_eq!(SocketMessage::parse(ping_frame()).kind, FrameKind::Ping);
        assert_eq!(SocketMessage::parse(pong_frame()).kind, FrameKind::Pong);
    }
}
