//! Outbound seam to the CRM HTTP API.
//!
//! The core never talks HTTP directly; it hands a [`CrmRequest`] plus the bearer credential
//! to a [`CrmTransport`] and gets JSON back. The server crate provides the reqwest-backed
//! implementation.

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CrmRequest {
    pub method: HttpMethod,
    /// Path and query relative to the CRM base URL, e.g. `/api/v4/contacts?query=7999`.
    pub path: String,
    pub body: Option<Value>,
}

impl CrmRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self { method: HttpMethod::Get, path: path.into(), body: None }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self { method: HttpMethod::Post, path: path.into(), body: Some(body) }
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self { method: HttpMethod::Patch, path: path.into(), body: Some(body) }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("credential rejected (HTTP 401)")]
    Unauthorized,
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("request failed: {0}")]
    Network(String),
    #[error("response could not be decoded: {0}")]
    Decode(String),
}

#[async_trait]
pub trait CrmTransport: Send + Sync {
    /// Sends one authenticated request. An empty response body is returned as `Value::Null`.
    async fn send(
        &self,
        credential: &SecretString,
        request: CrmRequest,
    ) -> Result<Value, TransportError>;
}

/// Percent-encodes a query-string value.
pub fn encode_query(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

#[cfg(test)]
mod tests {
    use super::encode_query;

    #[test]
    fn encodes_reserved_and_non_ascii_characters() {
        assert_eq!(encode_query("79991234567"), "79991234567");
        assert_eq!(encode_query("Acme & Sons"), "Acme%20%26%20Sons");
        assert_eq!(encode_query("Ромашка"), "%D0%A0%D0%BE%D0%BC%D0%B0%D1%88%D0%BA%D0%B0");
    }
}
