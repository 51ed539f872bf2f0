//! Request description: endpoint, method, body and per-request overrides.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

/// HTTP methods the client issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// `GET`; the body becomes query parameters.
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
    /// `OPTIONS`
    Options,
}

impl HttpMethod {
    /// Upper-case method name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Self::GET,
            HttpMethod::Post => Self::POST,
            HttpMethod::Put => Self::PUT,
            HttpMethod::Patch => Self::PATCH,
            HttpMethod::Delete => Self::DELETE,
            HttpMethod::Options => Self::OPTIONS,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of one multipart field.
#[derive(Clone, Debug, PartialEq)]
pub enum FormValue {
    /// Plain text field.
    Text(String),
    /// File upload.
    File {
        /// File contents.
        bytes: Bytes,
        /// File name reported to the server.
        file_name: Option<String>,
        /// MIME type, e.g. `image/png`.
        mime: Option<String>,
    },
}

/// One multipart field.
#[derive(Clone, Debug, PartialEq)]
pub struct FormField {
    /// Field name.
    pub name: String,
    /// Field value.
    pub value: FormValue,
}

impl FormField {
    /// A text field.
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: FormValue::Text(value.into()),
        }
    }

    /// A file field.
    pub fn file(
        name: impl Into<String>,
        bytes: impl Into<Bytes>,
        file_name: Option<String>,
        mime: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: FormValue::File {
                bytes: bytes.into(),
                file_name,
                mime,
            },
        }
    }
}

/// Request payload.
///
/// Multipart bodies are kept as a field list and rebuilt into a
/// `reqwest::multipart::Form` for every attempt.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum RequestBody {
    /// No body.
    #[default]
    None,
    /// JSON body, or query parameters for `GET`.
    Json(Value),
    /// `multipart/form-data` body.
    Form(Vec<FormField>),
}

impl RequestBody {
    /// Whether the body is multipart.
    pub fn is_multipart(&self) -> bool {
        matches!(self, Self::Form(_))
    }

    /// JSON form of the body used for fingerprinting.
    ///
    /// File contents are represented by name, MIME type and length only.
    pub fn canonical(&self) -> Value {
        match self {
            Self::None => Value::Null,
            Self::Json(value) => value.clone(),
            Self::Form(fields) => Value::Array(
                fields
                    .iter()
                    .map(|field| match &field.value {
                        FormValue::Text(text) => serde_json::json!([field.name, text]),
                        FormValue::File {
                            bytes,
                            file_name,
                            mime,
                        } => serde_json::json!([
                            field.name,
                            {"fileName": file_name, "mime": mime, "len": bytes.len()}
                        ]),
                    })
                    .collect(),
            ),
        }
    }
}

/// Per-request adjustments applied after the computed defaults.
#[derive(Clone, Debug, Default)]
pub struct FetchOverrides {
    /// Headers that replace defaults and `Authorization`.
    pub headers: HeaderMap,
    /// Timeout for this request; overrides the client default.
    pub timeout: Option<Duration>,
}

/// Everything needed to issue one request.
#[derive(Clone, Debug)]
pub struct RequestSpec {
    /// Endpoint relative to the client base URL, or an absolute URL.
    pub endpoint: String,
    /// HTTP method.
    pub method: HttpMethod,
    /// Body.
    pub body: RequestBody,
    /// Header and timeout overrides.
    pub overrides: FetchOverrides,
}

impl RequestSpec {
    /// A bodiless request.
    pub fn new(method: HttpMethod, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            body: RequestBody::None,
            overrides: FetchOverrides::default(),
        }
    }

    /// A `GET` request.
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, endpoint)
    }

    /// A `POST` request.
    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, endpoint)
    }

    /// Set a JSON body (query parameters for `GET`).
    #[must_use]
    pub fn with_json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Set a multipart body.
    #[must_use]
    pub fn with_form(mut self, fields: Vec<FormField>) -> Self {
        self.body = RequestBody::Form(fields);
        self
    }

    /// Add an override header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        let _ = self.overrides.headers.insert(name, value);
        self
    }

    /// Set a timeout for this request.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.overrides.timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names() {
        assert_eq!(HttpMethod::Patch.to_string(), "PATCH");
        assert_eq!(reqwest::Method::from(HttpMethod::Options), reqwest::Method::OPTIONS);
    }

    #[test]
    fn form_canonical_omits_file_bytes() {
        let body = RequestBody::Form(vec![
            FormField::text("title", "report"),
            FormField::file("doc", vec![1u8, 2, 3], Some("a.pdf".into()), None),
        ]);
        let canonical = body.canonical();
        assert_eq!(canonical[0], serde_json::json!(["title", "report"]));
        assert_eq!(canonical[1][1]["len"], 3);
        assert_eq!(canonical[1][1]["fileName"], "a.pdf");
    }

    #[test]
    fn builder_sets_fields() {
        let spec = RequestSpec::post("orders")
            .with_json(serde_json::json!({"id": 1}))
            .with_timeout(Duration::from_secs(3))
            .with_header(
                HeaderName::from_static("x-trace"),
                HeaderValue::from_static("abc"),
            );
        assert_eq!(spec.method, HttpMethod::Post);
        assert!(!spec.body.is_multipart());
        assert_eq!(spec.overrides.timeout, Some(Duration::from_secs(3)));
        assert_eq!(spec.overrides.headers["x-trace"], "abc");
    }
}
