//! Request client core for the GitHub REST API.
//!
//! # Overview
//! Callers build a `Request` once at startup, optionally derive layered
//! defaults from it, and issue calls like
//! `request.send("GET /repos/{owner}/{repo}", params)`. Each call resolves
//! the route through an `Endpoint`, performs one round-trip through a
//! `Transport`, and classifies the response into a `ResponseEnvelope` or a
//! `RequestError`.
//!
//! # Design
//! - The network is behind the `Transport` trait. `ReqwestTransport` is the
//!   production implementation; tests script their own.
//! - Route merging is behind the `Endpoint` trait, with `RouteEndpoint` as the
//!   stock GitHub-style implementation.
//! - Every failure a caller sees is a `RequestError`. Transport problems are
//!   reported with status 500.
//! - `Request` values are immutable and cheap to clone; deriving defaults
//!   always produces a new value.

pub mod client;
pub mod endpoint;
pub mod error;
pub mod fetch;
pub mod http;
pub mod transport;

pub use client::{HookedRequest, Request, RequestHook};
pub use endpoint::{Endpoint, EndpointOptions, Parameters, RequestOptions, RouteEndpoint};
pub use error::{RequestError, TransportError};
pub use fetch::execute;
pub use http::{
    Headers, Method, RedirectPolicy, RequestBody, RequestDescriptor, ResponseData,
    ResponseEnvelope, TransportOptions,
};
pub use transport::{FetchInit, RawResponse, ReqwestTransport, ResponseBody, Transport};
