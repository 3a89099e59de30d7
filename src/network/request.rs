//! Transport-neutral request and response values.

use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// An HTTP request the orchestrator can issue (and re-issue).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RequestSpec {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self::new(Method::HEAD, url)
    }

    /// Adds a header, replacing any existing header of the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `value` as the body and sets the JSON content type.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_string(value)?;
        Ok(self.header("Content-Type", "application/json").body(body))
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Identity of the logical request: hex SHA-256 of method, url and body.
    ///
    /// Two requests with the same signature share failure bookkeeping and an
    /// offline queue slot.
    pub fn signature(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.method.as_str().as_bytes());
        hasher.update(b" ");
        hasher.update(self.url.as_bytes());
        hasher.update(b" ");
        hasher.update(self.body.as_deref().unwrap_or("").as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// A fully read HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// A request that produced no response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    /// The attempt was cut off by its timeout.
    pub timed_out: bool,
    /// No connection could be established.
    pub connect: bool,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: false,
            connect: false,
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self {
            message: format!("request timed out after {}ms", after.as_millis()),
            timed_out: true,
            connect: false,
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: false,
            connect: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_depends_on_method_url_and_body() {
        let a = RequestSpec::post("https://api.test/lessons").body("{\"id\":1}");
        let b = RequestSpec::post("https://api.test/lessons").body("{\"id\":2}");
        let c = RequestSpec::get("https://api.test/lessons");

        assert_ne!(a.signature(), b.signature());
        assert_ne!(a.signature(), c.signature());
        assert_eq!(a.signature(), a.clone().signature());
        assert_eq!(a.signature().len(), 64);
    }

    #[test]
    fn test_signature_ignores_headers() {
        let a = RequestSpec::get("https://api.test/x");
        let b = RequestSpec::get("https://api.test/x").header("X-Trace", "1");
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn test_header_replaces_case_insensitively() {
        let spec = RequestSpec::get("u")
            .header("content-type", "text/plain")
            .header("Content-Type", "application/json");
        assert_eq!(spec.headers.len(), 1);
        assert_eq!(spec.header_value("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn test_json_body() {
        let spec = RequestSpec::post("u").json(&serde_json::json!({"a": 1})).unwrap();
        assert_eq!(spec.body.as_deref(), Some(r#"{"a":1}"#));
        assert_eq!(spec.header_value("content-type"), Some("application/json"));
    }

    #[test]
    fn test_response_helpers() {
        let response = HttpResponse::new(201).with_body(r#"{"ok":true}"#);
        assert!(response.is_success());
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["ok"], true);
        assert!(!HttpResponse::new(503).is_success());
    }
}
