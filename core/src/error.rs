//! Error types for the request client.
//!
//! # Design
//! `RequestError` is the only error callers ever see. Every failure path,
//! from a 4xx body to a dropped connection, is folded into it and callers
//! branch on `status`. JSON fields from an error body that have no dedicated
//! slot are kept in `extra`.
//!
//! `TransportError` is what a `Transport` reports. The executor wraps it into
//! a `RequestError` with status 500 before it leaves the crate.

use reqwest::Url;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::http::{Headers, RequestDescriptor};

/// Structured error returned by every request.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct RequestError {
    pub message: String,
    /// HTTP status, or 500 for failures that never produced a usable response.
    pub status: u16,
    pub headers: Headers,
    /// Copy of the request with credentials redacted.
    pub request: RequestDescriptor,
    /// Fields merged in from a JSON error body.
    pub extra: Map<String, Value>,
}

impl RequestError {
    pub fn new(
        message: impl Into<String>,
        status: u16,
        headers: Headers,
        request: &RequestDescriptor,
    ) -> Self {
        Self {
            message: message.into(),
            status,
            headers,
            request: redact(request),
            extra: Map::new(),
        }
    }

    /// Failure that did not come from an HTTP status.
    pub fn internal(message: impl Into<String>, headers: Headers, request: &RequestDescriptor) -> Self {
        Self::new(message, 500, headers, request)
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Field merged from the JSON error body, if any.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }

    /// The `errors` list of a validation failure.
    pub fn errors(&self) -> &[Value] {
        match self.extra.get("errors") {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }

    pub fn documentation_url(&self) -> Option<&str> {
        self.extra.get("documentation_url").and_then(Value::as_str)
    }

    pub fn is_not_modified(&self) -> bool {
        self.status == 304
    }
}

/// Failures reported by a `Transport` implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{0}")]
    Network(String),

    #[error("redirect not allowed: {0}")]
    Redirect(String),

    #[error("request timed out")]
    Timeout,

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("failed to build http client: {0}")]
    Client(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_redirect() {
            TransportError::Redirect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            TransportError::Body(err.to_string())
        } else if err.is_builder() {
            TransportError::Client(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

const REDACTED: &str = "[REDACTED]";
const SECRET_PARAMS: [&str; 2] = ["client_secret", "access_token"];

/// Copy of `request` that is safe to attach to an error.
fn redact(request: &RequestDescriptor) -> RequestDescriptor {
    let mut copy = request.clone();
    if let Some(auth) = copy.headers.get("authorization") {
        let scheme = auth.split(' ').next().unwrap_or_default();
        let masked = format!("{scheme} {REDACTED}");
        copy.headers.insert("authorization", masked);
    }
    copy.url = redact_url(&copy.url);
    copy
}

/// Mask secret query params. Keys are compared after percent-decoding, so
/// `access%5Ftoken` is caught too. A url that does not parse is kept as is.
fn redact_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if !pairs.iter().any(|(key, _)| is_secret(key)) {
        return raw.to_string();
    }
    url.query_pairs_mut().clear().extend_pairs(pairs.iter().map(|(key, value)| {
        let value = if is_secret(key) { REDACTED } else { value.as_str() };
        (key.as_str(), value)
    }));
    url.to_string()
}

fn is_secret(key: &str) -> bool {
    SECRET_PARAMS.contains(&key)
}
