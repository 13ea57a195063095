//! The network capability the executor dispatches through.
//!
//! # Design
//! `Transport` mirrors a fetch-style call: it receives the url plus a
//! `FetchInit` and returns a `RawResponse` whose body has not been read yet.
//! The executor decides whether and how the body is consumed, so a response
//! that is classified without a body (204, HEAD) never touches it.
//!
//! `ReqwestTransport` is the production implementation. Tests plug in their
//! own `Transport` to script responses.

use async_trait::async_trait;
use bytes::Bytes;
use hyper::ext::ReasonPhrase;
use reqwest::redirect::Policy;
use serde_json::{Map, Value};

use crate::error::TransportError;
use crate::http::{Headers, Method, RedirectPolicy, RequestBody, TransportOptions};

/// Everything the transport needs besides the url.
#[derive(Debug, Clone)]
pub struct FetchInit {
    pub method: Method,
    pub body: Option<RequestBody>,
    pub headers: Headers,
    pub redirect: RedirectPolicy,
    pub timeout: Option<std::time::Duration>,
    /// Passthrough options, reserved keys already removed.
    pub extra: Map<String, Value>,
}

impl FetchInit {
    pub fn new(
        method: Method,
        body: Option<RequestBody>,
        headers: Headers,
        redirect: RedirectPolicy,
        options: &TransportOptions,
    ) -> Self {
        Self {
            method,
            body,
            headers,
            redirect,
            timeout: options.timeout,
            extra: options.passthrough(),
        }
    }
}

/// Lazily-read response body.
#[async_trait]
pub trait ResponseBody: Send {
    async fn bytes(self: Box<Self>) -> Result<Bytes, TransportError>;
}

/// A response whose status line and headers have arrived.
pub struct RawResponse {
    pub url: String,
    pub status: u16,
    pub status_text: String,
    /// Header pairs in the order the transport enumerated them.
    pub headers: Vec<(String, String)>,
    pub body: Box<dyn ResponseBody>,
}

impl std::fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawResponse")
            .field("url", &self.url)
            .field("status", &self.status)
            .field("status_text", &self.status_text)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl RawResponse {
    pub async fn bytes(self) -> Result<Bytes, TransportError> {
        self.body.bytes().await
    }

    /// Body decoded as UTF-8, invalid sequences replaced.
    pub async fn text(self) -> Result<String, TransportError> {
        let bytes = self.body.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Body that is already in memory.
#[derive(Debug, Clone, Default)]
pub struct BufferedBody(pub Bytes);

#[async_trait]
impl ResponseBody for BufferedBody {
    async fn bytes(self: Box<Self>) -> Result<Bytes, TransportError> {
        let BufferedBody(bytes) = *self;
        Ok(bytes)
    }
}

/// Fetch-style network capability.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, url: &str, init: FetchInit) -> Result<RawResponse, TransportError>;
}

/// `Transport` backed by `reqwest`.
///
/// reqwest fixes the redirect policy per client, so one client is built for
/// each `RedirectPolicy`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    follow: reqwest::Client,
    manual: reqwest::Client,
    error: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let follow = reqwest::Client::builder().build()?;
        let manual = reqwest::Client::builder().redirect(Policy::none()).build()?;
        let error = reqwest::Client::builder()
            .redirect(Policy::custom(|attempt| {
                let target = attempt.url().to_string();
                attempt.error(TransportError::Redirect(target))
            }))
            .build()?;
        Ok(Self { follow, manual, error })
    }

    fn client(&self, redirect: RedirectPolicy) -> &reqwest::Client {
        match redirect {
            RedirectPolicy::Follow => &self.follow,
            RedirectPolicy::Manual => &self.manual,
            RedirectPolicy::Error => &self.error,
        }
    }
}

struct ReqwestBody(reqwest::Response);

#[async_trait]
impl ResponseBody for ReqwestBody {
    async fn bytes(self: Box<Self>) -> Result<Bytes, TransportError> {
        let ReqwestBody(response) = *self;
        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn fetch(&self, url: &str, init: FetchInit) -> Result<RawResponse, TransportError> {
        let mut builder = self.client(init.redirect).request(init.method, url);
        for (name, value) in init.headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(body) = &init.body {
            builder = builder.body(body.to_bytes());
        }
        if let Some(timeout) = init.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        // hyper records the phrase only when it differs from the canonical one.
        let status_text = match response.extensions().get::<ReasonPhrase>() {
            Some(reason) => String::from_utf8_lossy(reason.as_bytes()).into_owned(),
            None => status.canonical_reason().unwrap_or("Unknown").to_string(),
        };
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        Ok(RawResponse {
            url: response.url().to_string(),
            status: status.as_u16(),
            status_text,
            headers,
            body: Box::new(ReqwestBody(response)),
        })
    }
}
