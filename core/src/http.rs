//! Plain-data HTTP types shared by the executor, the transport and callers.
//!
//! # Design
//! A `RequestDescriptor` is the fully-resolved bundle handed to the executor;
//! a `ResponseEnvelope` is what comes back on success. Neither type knows
//! anything about the network. `Headers` keeps insertion order so callers see
//! response headers in the order the transport enumerated them.

use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

pub use reqwest::Method;

/// Ordered header mapping with lower-cased names.
///
/// Inserting a name that already exists replaces its value in place, so the
/// position of the first occurrence is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        let name = name.as_ref().to_ascii_lowercase();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Add a value for `name`, joining it onto an existing value with `", "`
    /// the way repeated response headers are combined.
    pub fn append(&mut self, name: impl AsRef<str>, value: impl AsRef<str>) {
        let name = name.as_ref().to_ascii_lowercase();
        let value = value.as_ref();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => {
                entry.1.push_str(", ");
                entry.1.push_str(value);
            }
            None => self.entries.push((name, value.to_string())),
        }
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(n, _)| n.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(idx).1)
    }

    /// Layer `other` on top of `self`; values from `other` win.
    pub fn extend(&mut self, other: &Headers) {
        for (name, value) in other.iter() {
            self.insert(name, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

impl Serialize for Headers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// A request body as supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Text(String),
    Bytes(Bytes),
}

impl RequestBody {
    /// Serialize JSON objects and arrays to text. Everything else is returned
    /// unchanged.
    pub fn normalize(self) -> Result<RequestBody, serde_json::Error> {
        match self {
            RequestBody::Json(value @ (Value::Object(_) | Value::Array(_))) => {
                Ok(RequestBody::Text(serde_json::to_string(&value)?))
            }
            other => Ok(other),
        }
    }

    /// Bytes to put on the wire. JSON scalars are written as their JSON text,
    /// except strings which are written verbatim.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            RequestBody::Json(Value::String(s)) => Bytes::from(s.clone()),
            RequestBody::Json(value) => Bytes::from(value.to_string()),
            RequestBody::Text(text) => Bytes::from(text.clone()),
            RequestBody::Bytes(bytes) => bytes.clone(),
        }
    }
}

/// What the transport does when the server answers with a redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedirectPolicy {
    #[default]
    Follow,
    Manual,
    Error,
}

/// Options handed through to the transport untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportOptions {
    pub timeout: Option<Duration>,
    pub extra: Map<String, Value>,
}

impl TransportOptions {
    /// Keys that belong to the explicit dispatch fields and are never taken
    /// from the passthrough map.
    pub const RESERVED: [&'static str; 4] = ["method", "body", "headers", "redirect"];

    /// Passthrough map with the reserved keys removed.
    pub fn passthrough(&self) -> Map<String, Value> {
        self.extra
            .iter()
            .filter(|(k, _)| !Self::RESERVED.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// A fully-resolved request ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: Option<RequestBody>,
    pub redirect: RedirectPolicy,
    pub options: TransportOptions,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            body: None,
            redirect: RedirectPolicy::default(),
            options: TransportOptions::default(),
        }
    }
}

/// Payload of a successful response.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ResponseData {
    /// No body was read (204/205, successful HEAD).
    #[default]
    Empty,
    Json(Value),
    Text(String),
    Bytes(Bytes),
}

impl ResponseData {
    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseData::Empty)
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseData::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseData::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            ResponseData::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Normalized success result.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub status: u16,
    pub url: String,
    pub headers: Headers,
    pub data: ResponseData,
}

impl ResponseEnvelope {
    /// Deserialize a JSON payload into `T`. Non-JSON payloads deserialize
    /// from `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.data {
            ResponseData::Json(value) => T::deserialize(value),
            _ => T::deserialize(&Value::Null),
        }
    }
}
