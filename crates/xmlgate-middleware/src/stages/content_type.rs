//! Content-type guard middleware.
//!
//! The adapter registers two guards: one expecting `application/xml` before
//! the transcoder and one expecting `application/json` after it. Both apply
//! only to POST, PUT and PATCH.
//!
//! # Rules
//!
//! - A present `content-type` is split on `;`. The first segment must equal
//!   the expected media type exactly and the second segment, if present, must
//!   not be empty. Otherwise a `415 INVALID_CONTENT_TYPE_ONLY_<XML|JSON>`
//!   error is raised.
//! - A missing `content-type` passes.
//! - For PUT and PATCH, `content-length: 0` is answered directly with
//!   `400 Malformed document`, bypassing the error handler.

use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{Method, StatusCode};
use xmlgate_core::{malformed_document_body, AdapterError};

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::pipeline::Stage;
use crate::types::{Request, Response, ResponseExt, APPLICATION_JSON, APPLICATION_XML};

/// Returns `true` for POST, PUT and PATCH.
pub(crate) fn is_mutating(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Middleware enforcing one expected media type on mutating requests.
#[derive(Debug, Clone, Copy)]
pub struct ContentTypeGuard {
    expected: &'static str,
    stage: Stage,
}

impl ContentTypeGuard {
    /// Guard placed before the transcoder.
    #[must_use]
    pub const fn xml() -> Self {
        Self {
            expected: APPLICATION_XML,
            stage: Stage::XmlContentType,
        }
    }

    /// Guard placed after the transcoder.
    #[must_use]
    pub const fn json() -> Self {
        Self {
            expected: APPLICATION_JSON,
            stage: Stage::JsonContentType,
        }
    }

    /// Returns the expected media type.
    #[must_use]
    pub const fn expected(&self) -> &'static str {
        self.expected
    }

    /// Checks a raw `content-type` value.
    #[must_use]
    pub fn accepts(&self, content_type: &str) -> bool {
        let mut parts = content_type.split(';');
        let media_type = parts.next().unwrap_or_default();
        media_type == self.expected && parts.next() != Some("")
    }

    fn check(&self, request: &Request) -> Result<(), Rejection> {
        let method = request.method();
        if is_mutating(method) {
            if let Some(value) = request.headers().get(CONTENT_TYPE) {
                let accepted = value.to_str().is_ok_and(|ct| self.accepts(ct));
                if !accepted {
                    return Err(Rejection::ContentType);
                }
            }
        }
        if matches!(*method, Method::PUT | Method::PATCH)
            && request
                .headers()
                .get(CONTENT_LENGTH)
                .is_some_and(|len| len.as_bytes() == b"0")
        {
            return Err(Rejection::EmptyBody);
        }
        Ok(())
    }
}

enum Rejection {
    ContentType,
    EmptyBody,
}

impl Middleware for ContentTypeGuard {
    fn name(&self) -> &'static str {
        self.stage.name()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let verdict = self.check(&request);
            match verdict {
                Ok(()) => next.run(ctx, request).await,
                Err(Rejection::ContentType) => {
                    tracing::warn!(
                        request_id = %ctx.request_id(),
                        expected = self.expected,
                        content_type = ?request.headers().get(CONTENT_TYPE),
                        "rejected content type"
                    );
                    Response::raised(AdapterError::invalid_content_type(self.expected))
                }
                Err(Rejection::EmptyBody) => {
                    tracing::warn!(
                        request_id = %ctx.request_id(),
                        method = %request.method(),
                        "rejected empty document"
                    );
                    Response::json(StatusCode::BAD_REQUEST, &malformed_document_body())
                }
            }
        })
    }
}
