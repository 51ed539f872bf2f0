//! One HTTP attempt: build, authorize, send, classify.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::multipart;
use serde_json::Value;
use tether_auth::TokenAuthority;
use tether_auth::authority::join_url;
use tracing::debug;

use crate::errors::{API_ERROR_CODE, RequestError};
use crate::request::{FormField, FormValue, HttpMethod, RequestBody, RequestSpec};

/// Default name of the error-indicator field.
pub const DEFAULT_ERROR_FIELD: &str = "errorMessage";

/// Performs single request attempts against one base URL.
#[derive(Clone)]
pub struct RequestExecutor {
    client: reqwest::Client,
    base_url: String,
    authority: Option<Arc<TokenAuthority>>,
    error_field: String,
    default_timeout: Option<Duration>,
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("base_url", &self.base_url)
            .field("authorized", &self.authority.is_some())
            .field("error_field", &self.error_field)
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

impl RequestExecutor {
    /// Create an executor. Requests are unauthenticated when `authority` is
    /// `None`.
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        authority: Option<Arc<TokenAuthority>>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            authority,
            error_field: DEFAULT_ERROR_FIELD.to_string(),
            default_timeout: None,
        }
    }

    /// Use `field` as the error indicator in 2xx bodies.
    #[must_use]
    pub fn with_error_field(mut self, field: impl Into<String>) -> Self {
        self.error_field = field.into();
        self
    }

    /// Apply `timeout` to requests that set none of their own.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Base URL endpoints are resolved against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue `spec` once and classify the outcome.
    #[tracing::instrument(skip_all, fields(method = %spec.method, endpoint = %spec.endpoint))]
    pub async fn execute(
        &self,
        spec: &RequestSpec,
        treat_error_message_as_error: bool,
    ) -> Result<Value, RequestError> {
        if spec.endpoint.trim().is_empty() {
            return Err(RequestError::Config("endpoint is required".to_string()));
        }

        let url = join_url(&self.base_url, &spec.endpoint);
        let headers = self.build_headers(spec, &url).await;

        let mut builder = self
            .client
            .request(spec.method.into(), &url)
            .headers(headers);

        match (&spec.method, &spec.body) {
            (HttpMethod::Get, RequestBody::Json(value)) => {
                builder = builder.query(&query_params(value));
            }
            (HttpMethod::Get, RequestBody::Form(_)) => {
                debug!("multipart body ignored for GET");
            }
            (_, RequestBody::Json(value)) => {
                builder = builder.body(serde_json::to_vec(value)?);
            }
            (_, RequestBody::Form(fields)) => {
                builder = builder.multipart(build_form(fields)?);
            }
            (_, RequestBody::None) => {}
        }

        if let Some(timeout) = spec.overrides.timeout.or(self.default_timeout) {
            builder = builder.timeout(timeout);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            let message = if text.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                text
            };
            debug!(status = status.as_u16(), "transport error");
            return Err(RequestError::Transport {
                status: status.as_u16(),
                message,
            });
        }

        classify_body(&text, &self.error_field, treat_error_message_as_error)
    }

    /// Defaults, then `Authorization`, then caller overrides.
    async fn build_headers(&self, spec: &RequestSpec, url: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if !spec.body.is_multipart() {
            let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        if let Some(authority) = &self.authority {
            let _ = authority.prepare_auth_header(&mut headers, url).await;
        }

        for (name, value) in &spec.overrides.headers {
            let _ = headers.insert(name.clone(), value.clone());
        }
        headers
    }
}

/// Flatten a JSON object into query parameters.
///
/// Strings go in verbatim, numbers and booleans are stringified, `null` is
/// skipped, arrays and objects are JSON-encoded. Non-object values yield no
/// parameters.
pub fn query_params(value: &Value) -> Vec<(String, String)> {
    let Value::Object(map) = value else {
        return Vec::new();
    };
    map.iter()
        .filter_map(|(key, value)| {
            let rendered = match value {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => {
                    value.to_string()
                }
            };
            Some((key.clone(), rendered))
        })
        .collect()
}

/// Turn a 2xx body into a payload or a business error.
///
/// Empty bodies become `null`; bodies that are not JSON become a JSON
/// string.
pub fn classify_body(
    text: &str,
    error_field: &str,
    treat_error_message_as_error: bool,
) -> Result<Value, RequestError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }

    let Ok(payload) = serde_json::from_str::<Value>(text) else {
        return Ok(Value::String(text.to_string()));
    };

    if treat_error_message_as_error {
        if let Some(message) = error_message(&payload, error_field) {
            return Err(RequestError::Business {
                code: API_ERROR_CODE.to_string(),
                message,
                payload,
            });
        }
    }
    Ok(payload)
}

fn error_message(payload: &Value, field: &str) -> Option<String> {
    match payload.get(field)? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn build_form(fields: &[FormField]) -> Result<multipart::Form, RequestError> {
    let mut form = multipart::Form::new();
    for field in fields {
        form = match &field.value {
            FormValue::Text(text) => form.text(field.name.clone(), text.clone()),
            FormValue::File {
                bytes,
                file_name,
                mime,
            } => {
                let mut part = multipart::Part::bytes(bytes.to_vec());
                if let Some(name) = file_name {
                    part = part.file_name(name.clone());
                }
                if let Some(mime) = mime {
                    part = part.mime_str(mime).map_err(|e| {
                        RequestError::Config(format!("invalid MIME type {mime:?}: {e}"))
                    })?;
                }
                form.part(field.name.clone(), part)
            }
        };
    }
    Ok(form)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
