//! Composed request values with layered defaults.
//!
//! # Design
//! `Request` bundles an `Endpoint` (with its accumulated defaults) and a
//! `Transport`. It is immutable: `defaults` returns a new `Request` and leaves
//! the parent as it was, so one value can be shared freely across tasks.
//!
//! A `RequestHook` set in the request options takes over dispatch. The hook
//! receives a `HookedRequest`, which runs the same merge, parse and execute
//! pipeline but never consults the hook again.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::endpoint::{Endpoint, EndpointOptions, Parameters, RouteEndpoint};
use crate::error::{RequestError, TransportError};
use crate::fetch;
use crate::http::ResponseEnvelope;
use crate::transport::{ReqwestTransport, Transport};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Identifies the host environment, e.g. `rust (linux; x86_64)`.
pub fn host_user_agent() -> String {
    format!("rust ({}; {})", std::env::consts::OS, std::env::consts::ARCH)
}

/// Baseline `user-agent` header value.
pub fn user_agent() -> String {
    format!("gh-request/{VERSION} {}", host_user_agent())
}

/// Interception point wrapped around dispatch.
#[async_trait]
pub trait RequestHook: Send + Sync {
    async fn call(
        &self,
        request: HookedRequest,
        options: EndpointOptions,
    ) -> Result<ResponseEnvelope, RequestError>;
}

/// A request function bound to merged defaults.
#[derive(Clone)]
pub struct Request {
    endpoint: Arc<dyn Endpoint>,
    transport: Arc<dyn Transport>,
}

impl Request {
    /// Request with the baseline defaults: GitHub base url, v3 accept header
    /// and the crate's user agent.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let defaults = Parameters::new().header("user-agent", user_agent());
        Self::with_defaults(Arc::new(RouteEndpoint::new()), transport, defaults)
    }

    /// `Request::new` over a `ReqwestTransport`.
    pub fn reqwest() -> Result<Self, TransportError> {
        Ok(Self::new(Arc::new(ReqwestTransport::new()?)))
    }

    /// Layer `defaults` on top of `endpoint`.
    pub fn with_defaults(
        endpoint: Arc<dyn Endpoint>,
        transport: Arc<dyn Transport>,
        defaults: Parameters,
    ) -> Self {
        Self {
            endpoint: endpoint.defaults(defaults),
            transport,
        }
    }

    pub fn endpoint(&self) -> &Arc<dyn Endpoint> {
        &self.endpoint
    }

    /// Derive a new request with `defaults` layered on top of this one.
    pub fn defaults(&self, defaults: Parameters) -> Request {
        Request::with_defaults(self.endpoint.clone(), self.transport.clone(), defaults)
    }

    /// Resolve `route` with `parameters` and perform the request.
    pub async fn send(
        &self,
        route: &str,
        parameters: Parameters,
    ) -> Result<ResponseEnvelope, RequestError> {
        let options = self.endpoint.merge(route, parameters);
        match options.request.hook.clone() {
            None => self.dispatch(options).await,
            Some(hook) => {
                debug!(method = %options.method, url = %options.url, "handing request to hook");
                hook.call(HookedRequest { inner: self.clone() }, options).await
            }
        }
    }

    async fn dispatch(&self, options: EndpointOptions) -> Result<ResponseEnvelope, RequestError> {
        let descriptor = self.endpoint.parse(options);
        fetch::execute(self.transport.as_ref(), descriptor).await
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("defaults", self.endpoint.options())
            .finish_non_exhaustive()
    }
}

/// The request function handed to a `RequestHook`.
#[derive(Clone, Debug)]
pub struct HookedRequest {
    inner: Request,
}

impl HookedRequest {
    /// Merge, parse and execute without going through the hook.
    pub async fn send(
        &self,
        route: &str,
        parameters: Parameters,
    ) -> Result<ResponseEnvelope, RequestError> {
        let options = self.inner.endpoint.merge(route, parameters);
        self.inner.dispatch(options).await
    }

    /// Execute options the hook already holds, e.g. the ones it was called
    /// with.
    pub async fn dispatch(&self, options: EndpointOptions) -> Result<ResponseEnvelope, RequestError> {
        self.inner.dispatch(options).await
    }

    pub fn endpoint(&self) -> &Arc<dyn Endpoint> {
        self.inner.endpoint()
    }

    pub fn defaults(&self, defaults: Parameters) -> Request {
        self.inner.defaults(defaults)
    }
}
