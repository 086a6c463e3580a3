//! Resource engine interface.
//!
//! The resource engine executes the five operation kinds against the service
//! model. The dispatch stage calls exactly one method per request and captures
//! the returned [`OperationResult`] for the materializer.
//!
//! A handler has three ways to answer:
//!
//! - return `Ok(Some(result))` with a result and/or status,
//! - write a complete response into the [`ResponseDraft`] via
//!   [`ResponseDraft::finalize`] and return `Ok(None)`,
//! - return `Ok(None)` without finalizing, in which case the adapter answers
//!   `204 No Content`.
//!
//! Errors are raised as [`AdapterError`] and rendered by the error stage.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::RequestId;
use crate::document::Document;
use crate::error::AdapterError;
use crate::target::ResolvedTarget;

/// A boxed future that is Send.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of one engine call.
pub type EngineResult = Result<Option<OperationResult>, AdapterError>;

/// The engine operation a request is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Insert a new instance (POST).
    Create,
    /// Read a collection or instance (GET, HEAD).
    Read,
    /// Update an instance (PUT, PATCH).
    Update,
    /// Delete an instance (DELETE).
    Delete,
    /// Invoke a custom operation.
    Invoke,
}

impl OperationKind {
    /// Picks the operation for a request.
    ///
    /// A detected custom operation wins over the method. Returns `None` for
    /// methods without a dispatch target.
    #[must_use]
    pub fn for_request(method: &Method, target: &ResolvedTarget) -> Option<Self> {
        if target.is_operation() {
            return Some(Self::Invoke);
        }
        match *method {
            Method::POST => Some(Self::Create),
            Method::GET | Method::HEAD => Some(Self::Read),
            Method::PUT | Method::PATCH => Some(Self::Update),
            Method::DELETE => Some(Self::Delete),
            _ => None,
        }
    }

    /// Returns the operation name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Invoke => "invoke",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed request handed to the engine.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    /// Selected operation.
    pub kind: OperationKind,
    /// HTTP method of the original request.
    pub method: Method,
    /// Resolved target.
    pub target: ResolvedTarget,
    /// Parsed JSON body, if any.
    pub body: Option<Value>,
    /// Request headers after transcoding.
    pub headers: HeaderMap,
    /// Request ID for correlation.
    pub request_id: RequestId,
}

/// Result of an engine call: `{result, status, location}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationResult {
    /// Result document.
    pub result: Option<Document>,
    /// Status chosen by the handler.
    pub status: Option<StatusCode>,
    /// Location of a created instance.
    pub location: Option<String>,
}

impl OperationResult {
    /// Creates a result carrying a document.
    #[must_use]
    pub fn with_result(result: impl Into<Document>) -> Self {
        Self {
            result: Some(result.into()),
            ..Self::default()
        }
    }

    /// Creates a result carrying only a status.
    #[must_use]
    pub fn with_status_only(status: StatusCode) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Sets the status.
    #[must_use]
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the location.
    #[must_use]
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Returns `true` when neither a result nor a status is present.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.result.is_none() && self.status.is_none()
    }
}

/// Response state a handler may set before returning.
///
/// The materializer never downgrades a non-200 status set here and never
/// overrides a `location` header set here.
#[derive(Debug)]
pub struct ResponseDraft {
    status: StatusCode,
    headers: HeaderMap,
    finalized: Option<http::Response<Bytes>>,
}

impl Default for ResponseDraft {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseDraft {
    /// Creates a draft with status 200 and no headers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            finalized: None,
        }
    }

    /// Returns the current status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Sets the status.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Returns the headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the headers mutably.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Writes the complete response; the adapter sends it unchanged.
    pub fn finalize(&mut self, response: http::Response<Bytes>) {
        self.finalized = Some(response);
    }

    /// Returns `true` once a response was written.
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.finalized.is_some()
    }

    /// Takes the finalized response, if any.
    pub fn take_finalized(&mut self) -> Option<http::Response<Bytes>> {
        self.finalized.take()
    }

    /// Splits the draft into status and headers.
    #[must_use]
    pub fn into_parts(self) -> (StatusCode, HeaderMap) {
        (self.status, self.headers)
    }
}

/// Executes entity CRUD and custom operations.
pub trait ResourceEngine: Send + Sync {
    /// Inserts a new instance.
    fn create<'a>(
        &'a self,
        request: &'a EngineRequest,
        response: &'a mut ResponseDraft,
    ) -> BoxFuture<'a, EngineResult>;

    /// Reads a collection or instance.
    fn read<'a>(
        &'a self,
        request: &'a EngineRequest,
        response: &'a mut ResponseDraft,
    ) -> BoxFuture<'a, EngineResult>;

    /// Updates an instance.
    fn update<'a>(
        &'a self,
        request: &'a EngineRequest,
        response: &'a mut ResponseDraft,
    ) -> BoxFuture<'a, EngineResult>;

    /// Deletes an instance.
    fn delete<'a>(
        &'a self,
        request: &'a EngineRequest,
        response: &'a mut ResponseDraft,
    ) -> BoxFuture<'a, EngineResult>;

    /// Invokes a custom operation.
    fn invoke<'a>(
        &'a self,
        request: &'a EngineRequest,
        response: &'a mut ResponseDraft,
    ) -> BoxFuture<'a, EngineResult>;

    /// Calls the method matching `request.kind`.
    fn execute<'a>(
        &'a self,
        request: &'a EngineRequest,
        response: &'a mut ResponseDraft,
    ) -> BoxFuture<'a, EngineResult> {
        match request.kind {
            OperationKind::Create => self.create(request, response),
            OperationKind::Read => self.read(request, response),
            OperationKind::Update => self.update(request, response),
            OperationKind::Delete => self.delete(request, response),
            OperationKind::Invoke => self.invoke(request, response),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_for_method() {
        let books = ResolvedTarget::collection("Books");
        assert_eq!(
            OperationKind::for_request(&Method::POST, &books),
            Some(OperationKind::Create)
        );
        assert_eq!(
            OperationKind::for_request(&Method::HEAD, &books),
            Some(OperationKind::Read)
        );
        assert_eq!(
            OperationKind::for_request(&Method::PATCH, &books),
            Some(OperationKind::Update)
        );
        assert_eq!(
            OperationKind::for_request(&Method::DELETE, &books),
            Some(OperationKind::Delete)
        );
        assert_eq!(OperationKind::for_request(&Method::OPTIONS, &books), None);
    }

    #[test]
    fn test_operation_wins_over_method() {
        let target = ResolvedTarget::unbound_operation("submitOrder");
        assert_eq!(
            OperationKind::for_request(&Method::GET, &target),
            Some(OperationKind::Invoke)
        );
    }

    #[test]
    fn test_operation_result_builders() {
        let created = OperationResult::with_result("x")
            .status(StatusCode::CREATED)
            .location("Books/1");
        assert!(!created.is_empty());
        assert_eq!(created.location.as_deref(), Some("Books/1"));
        assert!(OperationResult::default().is_empty());
        assert!(!OperationResult::with_status_only(StatusCode::NO_CONTENT).is_empty());
    }

    #[test]
    fn test_response_draft_finalize() {
        let mut draft = ResponseDraft::new();
        assert_eq!(draft.status(), StatusCode::OK);
        assert!(!draft.is_finalized());

        draft.finalize(http::Response::new(Bytes::from_static(b"done")));
        assert!(draft.is_finalized());
        assert_eq!(draft.take_finalized().unwrap().body(), "done");
        assert!(!draft.is_finalized());
    }
}
