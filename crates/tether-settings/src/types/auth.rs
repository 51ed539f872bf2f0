//! Token authority settings.

use serde::{Deserialize, Serialize};

/// Credentials and token endpoint settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Endpoint (relative to `api.baseUrl`) that issues tokens.
    pub token_endpoint: String,
    /// Account name sent to the token endpoint and used in the
    /// `Authorization` header.
    pub account: String,
    /// Account secret sent to the token endpoint.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub secret: String,
    /// Endpoints that never carry an `Authorization` header.
    pub public_endpoints: Vec<String>,
    /// Seconds subtracted from the server-reported token lifetime.
    pub expiry_buffer_secs: i64,
    /// File backing the session token store. `None` keeps tokens in memory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_file: Option<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            token_endpoint: "auth/token".to_string(),
            account: String::new(),
            secret: String::new(),
            public_endpoints: vec!["auth/login".to_string()],
            expiry_buffer_secs: 60,
            session_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_not_serialized_when_empty() {
        let json = serde_json::to_value(AuthSettings::default()).unwrap();
        assert!(json.get("secret").is_none());
        assert_eq!(json["tokenEndpoint"], "auth/token");
    }
}
