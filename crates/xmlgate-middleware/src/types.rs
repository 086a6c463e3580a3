//! Common types used throughout the adapter pipeline.
//!
//! Requests carry a streaming body so the transcoder can accumulate it chunk
//! by chunk; responses are always fully buffered.

use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use xmlgate_core::AdapterError;

/// Error produced by a request body stream.
pub type BodyError = Box<dyn std::error::Error + Send + Sync>;

/// The streaming request body type.
pub type Body = UnsyncBoxBody<Bytes, BodyError>;

/// The HTTP request type used in the pipeline.
pub type Request = http::Request<Body>;

/// The HTTP response type used in the pipeline.
pub type Response = http::Response<Full<Bytes>>;

/// JSON media type.
pub const APPLICATION_JSON: &str = "application/json";

/// XML media type.
pub const APPLICATION_XML: &str = "application/xml";

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Marker attached to a response that carries a raised [`AdapterError`].
///
/// The response body holds the transport's default plain-text rendering; the
/// error stage replaces it with the JSON envelope.
#[derive(Debug, Clone)]
pub struct RaisedError(pub Arc<AdapterError>);

/// Marker attached to a response that must not be written because the
/// request body stream was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aborted;

/// Creates a request body from a complete buffer.
pub fn full_body(bytes: impl Into<Bytes>) -> Body {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Creates an empty request body.
pub fn empty_body() -> Body {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Collects a request body bounded by `limit` bytes.
///
/// The collect future is boxed behind a concrete type so it can be awaited
/// inside `Send` async blocks without tripping rustc's higher-ranked lifetime
/// inference on the boxed error type.
pub(crate) fn collect_limited(
    body: Body,
    limit: usize,
) -> xmlgate_core::BoxFuture<'static, Result<http_body_util::Collected<Bytes>, BodyError>> {
    Box::pin(http_body_util::Limited::new(body, limit).collect())
}

/// Extension trait for building pipeline responses.
pub trait ResponseExt {
    /// Creates a JSON response.
    fn json(status: StatusCode, body: &serde_json::Value) -> Response;

    /// Creates a response with a plain-text body.
    fn text(status: StatusCode, body: impl Into<Bytes>) -> Response;

    /// Creates a response without body or content type.
    fn empty(status: StatusCode) -> Response;

    /// Renders a raised error with the default plain-text rendering and
    /// attaches the [`RaisedError`] marker.
    fn raised(error: AdapterError) -> Response;

    /// Creates a response carrying the [`Aborted`] marker.
    fn aborted() -> Response;

    /// Returns the raised error, if this response carries one.
    fn raised_error(&self) -> Option<&Arc<AdapterError>>;

    /// Returns `true` if this response carries the [`Aborted`] marker.
    fn is_aborted(&self) -> bool;
}

impl ResponseExt for Response {
    fn json(status: StatusCode, body: &serde_json::Value) -> Response {
        let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        response
    }

    fn text(status: StatusCode, body: impl Into<Bytes>) -> Response {
        let mut response = Response::new(Full::new(body.into()));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
        response
    }

    fn empty(status: StatusCode) -> Response {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = status;
        response
    }

    fn raised(error: AdapterError) -> Response {
        let mut response = Self::text(error.status_code(), error.to_string());
        response.extensions_mut().insert(RaisedError(Arc::new(error)));
        response
    }

    fn aborted() -> Response {
        let mut response = Self::empty(StatusCode::BAD_REQUEST);
        response.extensions_mut().insert(Aborted);
        response
    }

    fn raised_error(&self) -> Option<&Arc<AdapterError>> {
        self.extensions().get::<RaisedError>().map(|raised| &raised.0)
    }

    fn is_aborted(&self) -> bool {
        self.extensions().get::<Aborted>().is_some()
    }
}

/// Sets `content-length` to `len`.
pub fn set_content_length(headers: &mut http::HeaderMap, len: usize) {
    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
}
