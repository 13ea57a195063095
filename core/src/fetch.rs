//! Request execution and response classification.
//!
//! # Design
//! `execute` performs exactly one transport call and turns whatever comes
//! back into either a `ResponseEnvelope` or a `RequestError`. Status and
//! headers are captured as soon as the transport returns, before the body is
//! touched, so an error raised while reading the body still carries them.
//!
//! Classification order matters and is fixed: 204/205, then HEAD, then 304,
//! then >= 400, then content negotiation. A HEAD request never reaches the 304
//! branch.

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{RequestError, TransportError};
use crate::http::{Headers, Method, RequestDescriptor, ResponseData, ResponseEnvelope};
use crate::transport::{FetchInit, Transport};

/// How a success body is read, decided from the `content-type` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Text,
    Bytes,
}

/// Loose pattern match on the raw header value. No media-type parsing.
pub fn classify_content_type(content_type: Option<&str>) -> BodyKind {
    match content_type {
        Some(ct) if ct.contains("application/json") => BodyKind::Json,
        None => BodyKind::Text,
        Some(ct) if ct.starts_with("text/") || ct.ends_with("charset=utf-8") => BodyKind::Text,
        Some(_) => BodyKind::Bytes,
    }
}

/// Failure inside the pipeline, before it is normalized.
enum Failure {
    Request(RequestError),
    Unexpected(String),
}

impl From<RequestError> for Failure {
    fn from(err: RequestError) -> Self {
        Failure::Request(err)
    }
}

impl From<TransportError> for Failure {
    fn from(err: TransportError) -> Self {
        Failure::Unexpected(err.to_string())
    }
}

impl From<serde_json::Error> for Failure {
    fn from(err: serde_json::Error) -> Self {
        Failure::Unexpected(err.to_string())
    }
}

/// Dispatch `request` through `transport` and classify the result.
pub async fn execute(
    transport: &dyn Transport,
    mut request: RequestDescriptor,
) -> Result<ResponseEnvelope, RequestError> {
    if let Some(body) = request.body.take() {
        match body.normalize() {
            Ok(body) => request.body = Some(body),
            Err(e) => return Err(RequestError::internal(e.to_string(), Headers::new(), &request)),
        }
    }

    let mut headers = Headers::new();
    match dispatch(transport, &request, &mut headers).await {
        Ok(envelope) => Ok(envelope),
        Err(Failure::Request(err)) => Err(err),
        Err(Failure::Unexpected(message)) => {
            warn!(method = %request.method, url = %request.url, error = %message, "request failed");
            Err(RequestError::internal(message, headers, &request))
        }
    }
}

async fn dispatch(
    transport: &dyn Transport,
    request: &RequestDescriptor,
    headers: &mut Headers,
) -> Result<ResponseEnvelope, Failure> {
    let init = FetchInit::new(
        request.method.clone(),
        request.body.clone(),
        request.headers.clone(),
        request.redirect,
        &request.options,
    );
    debug!(method = %request.method, url = %request.url, "dispatching request");
    let response = transport.fetch(&request.url, init).await?;

    let url = response.url.clone();
    let status = response.status;
    for (name, value) in &response.headers {
        headers.append(name, value);
    }
    debug!(status, url = %url, "response received");

    let envelope = |headers: &Headers, data| ResponseEnvelope {
        status,
        url: url.clone(),
        headers: headers.clone(),
        data,
    };

    if status == 204 || status == 205 {
        return Ok(envelope(headers, ResponseData::Empty));
    }

    if request.method == Method::HEAD {
        if status < 400 {
            return Ok(envelope(headers, ResponseData::Empty));
        }
        return Err(RequestError::new(response.status_text, status, headers.clone(), request).into());
    }

    if status == 304 {
        return Err(RequestError::new("Not modified", status, headers.clone(), request).into());
    }

    if status >= 400 {
        let text = response.text().await?;
        return Err(error_from_body(text, status, headers.clone(), request).into());
    }

    let data = match classify_content_type(headers.get("content-type")) {
        BodyKind::Json => ResponseData::Json(serde_json::from_str(&response.text().await?)?),
        BodyKind::Text => ResponseData::Text(response.text().await?),
        BodyKind::Bytes => ResponseData::Bytes(response.bytes().await?),
    };
    Ok(envelope(headers, data))
}

/// Build the error for a >= 400 response from its raw body text.
///
/// A JSON object body is merged into `extra`. If it carries an `errors`
/// array, each entry is appended to the message as compact JSON.
fn error_from_body(
    text: String,
    status: u16,
    headers: Headers,
    request: &RequestDescriptor,
) -> RequestError {
    let mut error = RequestError::new(text, status, headers, request);
    let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(&error.message) else {
        return error;
    };

    if let Some(Value::Array(errors)) = fields.get("errors") {
        let base = match fields.get("message") {
            Some(Value::String(message)) => message.clone(),
            _ => error.message.clone(),
        };
        let joined = errors.iter().map(Value::to_string).collect::<Vec<_>>().join(", ");
        error.message = format!("{base}: {joined}");
    }
    error.extra = fields;
    error
}
