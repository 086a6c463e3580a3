//! Error rendering middleware.
//!
//! Registered directly after discovery, so it wraps every stage that can
//! raise. A response carrying a [`RaisedError`](crate::types::RaisedError)
//! marker is replaced by the JSON envelope:
//!
//! ```json
//! {
//!   "error": {
//!     "code": "415",
//!     "message": "INVALID_CONTENT_TYPE_ONLY_XML",
//!     "statusCode": 415
//!   },
//!   "request_id": "0190a3b2-..."
//! }
//! ```
//!
//! Responses produced directly by a stage (invalid XML, malformed document,
//! finalized handler responses) carry no marker and pass through untouched.

use http::header::{HeaderValue, CONTENT_TYPE};
use xmlgate_core::AdapterError;

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::pipeline::Stage;
use crate::types::{Request, Response, ResponseExt, APPLICATION_JSON};

/// Message replacing the details of 5xx errors.
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred";

/// Middleware rendering raised errors as JSON envelopes.
#[derive(Debug, Clone)]
pub struct ErrorHandlerMiddleware {
    expose_internal_errors: bool,
    internal_error_message: String,
}

impl Default for ErrorHandlerMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorHandlerMiddleware {
    /// Creates the stage with 5xx details hidden.
    #[must_use]
    pub fn new() -> Self {
        Self {
            expose_internal_errors: false,
            internal_error_message: INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }

    /// Sets whether 5xx messages reach the client.
    ///
    /// **Warning**: Only enable this in development environments.
    #[must_use]
    pub fn expose_internal_errors(mut self, expose: bool) -> Self {
        self.expose_internal_errors = expose;
        self
    }

    /// Sets the message used for hidden 5xx errors.
    #[must_use]
    pub fn internal_error_message(mut self, message: &str) -> Self {
        self.internal_error_message = message.to_string();
        self
    }

    /// Renders `error` as an envelope response.
    #[must_use]
    pub fn render(&self, ctx: &MiddlewareContext, error: &AdapterError) -> Response {
        let status = error.status_code();
        let request_id = ctx.request_id().to_string();
        let mut envelope = error.to_envelope(Some(&request_id));

        if status.is_server_error() {
            tracing::error!(
                request_id = %request_id,
                status = status.as_u16(),
                code = %envelope.error.code,
                error = %error,
                "request failed"
            );
            if !self.expose_internal_errors {
                envelope.error.message.clone_from(&self.internal_error_message);
            }
        } else {
            tracing::debug!(
                request_id = %request_id,
                status = status.as_u16(),
                code = %envelope.error.code,
                "rendering raised error"
            );
        }

        match serde_json::to_value(&envelope) {
            Ok(body) => Response::json(status, &body),
            Err(err) => {
                tracing::error!(request_id = %request_id, error = %err, "failed to serialize error envelope");
                let mut response = Response::text(status, self.internal_error_message.clone());
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
                response
            }
        }
    }
}

impl Middleware for ErrorHandlerMiddleware {
    fn name(&self) -> &'static str {
        Stage::ErrorHandler.name()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let response = next.run(ctx, request).await;
            match response.raised_error().cloned() {
                Some(error) => self.render(ctx, &error),
                None => response,
            }
        })
    }
}
