//! Route resolution: turning `"GET /repos/{owner}/{repo}"` plus parameters
//! into a `RequestDescriptor`.
//!
//! # Design
//! `Endpoint` is the seam the request client consumes: `defaults` layers
//! configuration, `merge` folds a route and per-call parameters on top of the
//! current defaults, and `parse` resolves the result into something the
//! executor can dispatch. Layering is always defaults, then route, then
//! parameters, with later values winning. Deriving new defaults never touches
//! the parent endpoint.
//!
//! `RouteEndpoint` is the stock implementation for GitHub-style routes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::client::RequestHook;
use crate::http::{Headers, Method, RedirectPolicy, RequestBody, RequestDescriptor, TransportOptions};

pub const DEFAULT_BASE_URL: &str = "https://api.github.com";
pub const DEFAULT_ACCEPT: &str = "application/vnd.github.v3+json";
const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Per-request behaviour that is not part of the HTTP message itself.
#[derive(Clone, Default)]
pub struct RequestOptions {
    /// Intercepts dispatch when set.
    pub hook: Option<Arc<dyn RequestHook>>,
    pub redirect: Option<RedirectPolicy>,
    pub timeout: Option<Duration>,
    /// Passed through to the transport.
    pub extra: Map<String, Value>,
}

impl RequestOptions {
    fn layer(&mut self, other: RequestOptions) {
        if other.hook.is_some() {
            self.hook = other.hook;
        }
        if other.redirect.is_some() {
            self.redirect = other.redirect;
        }
        if other.timeout.is_some() {
            self.timeout = other.timeout;
        }
        self.extra.extend(other.extra);
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("hook", &self.hook.is_some())
            .field("redirect", &self.redirect)
            .field("timeout", &self.timeout)
            .field("extra", &self.extra)
            .finish()
    }
}

/// Caller-supplied parameters, used both for per-call values and for
/// layered defaults. Unset fields leave the underlying value alone.
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    pub method: Option<Method>,
    pub base_url: Option<String>,
    pub url: Option<String>,
    pub headers: Headers,
    pub request: RequestOptions,
    /// Explicit body. Takes precedence over a `data` param.
    pub body: Option<RequestBody>,
    /// Url placeholders, query values and body fields.
    pub params: Map<String, Value>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn hook(mut self, hook: Arc<dyn RequestHook>) -> Self {
        self.request.hook = Some(hook);
        self
    }

    pub fn redirect(mut self, redirect: RedirectPolicy) -> Self {
        self.request.redirect = Some(redirect);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.request.timeout = Some(timeout);
        self
    }

    /// Transport passthrough option.
    pub fn request_option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.request.extra.insert(name.into(), value.into());
        self
    }
}

/// Fully merged options, ready to be parsed into a descriptor.
#[derive(Debug, Clone)]
pub struct EndpointOptions {
    pub method: Method,
    pub base_url: String,
    pub url: String,
    pub headers: Headers,
    pub request: RequestOptions,
    pub body: Option<RequestBody>,
    pub params: Map<String, Value>,
}

impl Default for EndpointOptions {
    fn default() -> Self {
        let mut headers = Headers::new();
        headers.insert("accept", DEFAULT_ACCEPT);
        Self {
            method: Method::GET,
            base_url: DEFAULT_BASE_URL.to_string(),
            url: String::new(),
            headers,
            request: RequestOptions::default(),
            body: None,
            params: Map::new(),
        }
    }
}

impl EndpointOptions {
    fn layer(&mut self, parameters: Parameters) {
        let Parameters {
            method,
            base_url,
            url,
            headers,
            request,
            body,
            params,
        } = parameters;
        if let Some(method) = method {
            self.method = method;
        }
        if let Some(base_url) = base_url {
            self.base_url = base_url;
        }
        if let Some(url) = url {
            self.url = url;
        }
        self.headers.extend(&headers);
        self.request.layer(request);
        if body.is_some() {
            self.body = body;
        }
        self.params.extend(params);
    }
}

/// Route merging and resolution capability.
pub trait Endpoint: Send + Sync {
    /// Current defaults.
    fn options(&self) -> &EndpointOptions;

    /// New endpoint with `defaults` layered on top of this one.
    fn defaults(&self, defaults: Parameters) -> Arc<dyn Endpoint>;

    /// Fold `route` and `parameters` into the current defaults.
    fn merge(&self, route: &str, parameters: Parameters) -> EndpointOptions;

    /// Resolve merged options into a dispatchable request.
    fn parse(&self, options: EndpointOptions) -> RequestDescriptor;
}

/// `Endpoint` for GitHub-style route templates.
#[derive(Debug, Clone, Default)]
pub struct RouteEndpoint {
    defaults: EndpointOptions,
}

impl RouteEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(defaults: EndpointOptions) -> Self {
        Self { defaults }
    }
}

impl Endpoint for RouteEndpoint {
    fn options(&self) -> &EndpointOptions {
        &self.defaults
    }

    fn defaults(&self, defaults: Parameters) -> Arc<dyn Endpoint> {
        let mut options = self.defaults.clone();
        options.layer(defaults);
        Arc::new(RouteEndpoint::with_options(options))
    }

    fn merge(&self, route: &str, parameters: Parameters) -> EndpointOptions {
        let mut options = self.defaults.clone();
        let (method, url) = split_route(route);
        if let Some(method) = method {
            options.method = method;
        }
        if !url.is_empty() {
            options.url = url.to_string();
        }
        options.layer(parameters);
        options
    }

    fn parse(&self, options: EndpointOptions) -> RequestDescriptor {
        parse_options(options)
    }
}

/// Split `"GET /path"` into method and url. A leading token that is not an
/// alphabetic method name leaves the whole route as the url.
fn split_route(route: &str) -> (Option<Method>, &str) {
    let route = route.trim();
    if let Some((token, rest)) = route.split_once(' ') {
        if !token.is_empty() && token.chars().all(|c| c.is_ascii_alphabetic()) {
            if let Ok(method) = Method::from_bytes(token.to_ascii_uppercase().as_bytes()) {
                return (Some(method), rest.trim());
            }
        }
    }
    (None, route)
}

fn parse_options(options: EndpointOptions) -> RequestDescriptor {
    let EndpointOptions {
        method,
        base_url,
        url,
        mut headers,
        request,
        mut body,
        mut params,
    } = options;

    let data = take_param(&mut params, "data");
    if body.is_none() {
        body = data.map(RequestBody::Json);
    }

    let path = expand_template(&url, &mut params);
    let mut url = if path.starts_with("http://") || path.starts_with("https://") {
        path
    } else if path.starts_with('/') {
        format!("{}{}", base_url.trim_end_matches('/'), path)
    } else {
        format!("{}/{}", base_url.trim_end_matches('/'), path)
    };

    if !params.is_empty() {
        if method == Method::GET || method == Method::HEAD {
            let query = params
                .iter()
                .filter_map(|(k, v)| {
                    let value = value_to_string(v)?;
                    Some(format!("{}={}", urlencoding::encode(k), urlencoding::encode(&value)))
                })
                .collect::<Vec<_>>()
                .join("&");
            if !query.is_empty() {
                url.push(if url.contains('?') { '&' } else { '?' });
                url.push_str(&query);
            }
        } else if body.is_none() {
            body = Some(RequestBody::Json(Value::Object(params)));
        }
    }

    if body.is_none() && (method == Method::PATCH || method == Method::PUT) {
        body = Some(RequestBody::Text(String::new()));
    }

    if matches!(body, Some(RequestBody::Json(_) | RequestBody::Text(_))) && !headers.contains("content-type") {
        headers.insert("content-type", JSON_CONTENT_TYPE);
    }

    RequestDescriptor {
        method,
        url,
        headers,
        body,
        redirect: request.redirect.unwrap_or_default(),
        options: TransportOptions {
            timeout: request.timeout,
            extra: request.extra,
        },
    }
}

/// Remove `name` from `params` without disturbing the order of the rest.
fn take_param(params: &mut Map<String, Value>, name: &str) -> Option<Value> {
    let value = params.get(name).cloned()?;
    params.retain(|k, _| k != name);
    Some(value)
}

/// Render a param for a url. `null` counts as absent.
fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(value_to_string)
                .collect::<Vec<_>>()
                .join(","),
        ),
        other => Some(other.to_string()),
    }
}

/// Expand `{name}`, `{+name}`, `{?a,b}` and `:name` placeholders, consuming
/// the params they use.
fn expand_template(template: &str, params: &mut Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        out.push_str(&expand_expression(&rest[start + 1..start + len], params));
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    expand_colon_segments(&out, params)
}

fn expand_expression(expr: &str, params: &mut Map<String, Value>) -> String {
    if let Some(names) = expr.strip_prefix('?') {
        let pairs: Vec<String> = names
            .split(',')
            .filter_map(|name| {
                let value = value_to_string(&take_param(params, name.trim())?)?;
                Some(format!("{}={}", name.trim(), urlencoding::encode(&value)))
            })
            .collect();
        return if pairs.is_empty() {
            String::new()
        } else {
            format!("?{}", pairs.join("&"))
        };
    }

    let (reserved, name) = match expr.strip_prefix('+') {
        Some(name) => (true, name),
        None => (false, expr),
    };
    let Some(value) = take_param(params, name.trim()).as_ref().and_then(value_to_string) else {
        return String::new();
    };
    let encoded = urlencoding::encode(&value).into_owned();
    if reserved {
        encoded.replace("%2F", "/")
    } else {
        encoded
    }
}

fn expand_colon_segments(url: &str, params: &mut Map<String, Value>) -> String {
    let (path, query) = match url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (url, None),
    };
    let path = path
        .split('/')
        .map(|segment| {
            let Some(name) = segment.strip_prefix(':') else {
                return segment.to_string();
            };
            match take_param(params, name).as_ref().and_then(value_to_string) {
                Some(value) => urlencoding::encode(&value).into_owned(),
                None => segment.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("/");
    match query {
        Some(query) => format!("{path}?{query}"),
        None => path,
    }
}
