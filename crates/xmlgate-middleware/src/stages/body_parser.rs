//! Canonical JSON body parser.
//!
//! Normalizes the request body into the shape the dispatcher hands to the
//! engine. A body transcoded from XML is already stored in the context and is
//! only checked structurally; a native JSON body is read here, bounded by the
//! configured limit.

use http::StatusCode;
use http_body_util::{BodyExt, LengthLimitError};
use serde_json::Value;
use xmlgate_core::AdapterError;

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::pipeline::Stage;
use crate::stages::content_type::is_mutating;
use crate::types::{collect_limited, empty_body, Request, Response, ResponseExt};

/// Middleware normalizing request bodies to a JSON object or array.
#[derive(Debug, Clone, Copy)]
pub struct JsonBodyParser {
    max_body_bytes: usize,
}

impl JsonBodyParser {
    /// Creates the stage with a limit on native JSON bodies.
    #[must_use]
    pub const fn new(max_body_bytes: usize) -> Self {
        Self { max_body_bytes }
    }

    fn check_shape(body: &Value) -> Result<(), AdapterError> {
        if body.is_object() || body.is_array() {
            Ok(())
        } else {
            Err(AdapterError::malformed("Malformed document"))
        }
    }
}

impl Middleware for JsonBodyParser {
    fn name(&self) -> &'static str {
        Stage::BodyParser.name()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if !is_mutating(request.method()) {
                return next.run(ctx, request).await;
            }

            if let Some(body) = ctx.body() {
                if let Err(err) = Self::check_shape(body) {
                    return Response::raised(err);
                }
                return next.run(ctx, request).await;
            }

            let (parts, body) = request.into_parts();
            let bytes = match collect_limited(body, self.max_body_bytes).await {
                Ok(collected) => collected.to_bytes(),
                Err(err) if err.is::<LengthLimitError>() => {
                    tracing::warn!(
                        request_id = %ctx.request_id(),
                        limit = self.max_body_bytes,
                        "JSON body over limit"
                    );
                    return Response::raised(AdapterError::payload_too_large(self.max_body_bytes));
                }
                Err(_) => return Response::aborted(),
            };

            if !bytes.is_empty() {
                let parsed = serde_json::from_slice::<Value>(&bytes)
                    .map_err(|err| {
                        tracing::debug!(request_id = %ctx.request_id(), error = %err, "invalid JSON body");
                        AdapterError::malformed("Malformed document")
                    })
                    .and_then(|value| Self::check_shape(&value).map(|()| value));
                match parsed {
                    Ok(value) => ctx.set_body(value),
                    Err(err) => return Response::raised(err),
                }
            }

            let request = http::Request::from_parts(parts, empty_body());
            next.run(ctx, request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::full_body;
    use http::Method;
    use serde_json::json;

    fn request(method: Method, body: &'static str) -> Request {
        http::Request::builder()
            .method(method)
            .uri("/Books")
            .body(full_body(body))
            .unwrap()
    }

    fn ok() -> Next<'static> {
        Next::handler(|_ctx, _req| Box::pin(async { Response::empty(StatusCode::OK) }))
    }

    #[tokio::test]
    async fn test_parses_native_json_body() {
        let stage = JsonBodyParser::new(1024);
        let mut ctx = MiddlewareContext::new();
        let response = stage
            .process(&mut ctx, request(Method::POST, r#"{"title":"Emma"}"#), ok())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(ctx.body(), Some(&json!({"title": "Emma"})));
    }

    #[tokio::test]
    async fn test_keeps_transcoded_body() {
        let stage = JsonBodyParser::new(1024);
        let mut ctx = MiddlewareContext::new();
        ctx.set_body(json!({"Book": {"title": "Emma"}}));
        let response = stage
            .process(&mut ctx, request(Method::PUT, "ignored"), ok())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(ctx.body(), Some(&json!({"Book": {"title": "Emma"}})));
    }

    #[tokio::test]
    async fn test_scalar_root_is_malformed() {
        let stage = JsonBodyParser::new(1024);
        let mut ctx = MiddlewareContext::new();
        let response = stage.process(&mut ctx, request(Method::POST, "42"), ok()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.raised_error().unwrap().to_string(),
            "Malformed document"
        );
    }

    #[tokio::test]
    async fn test_invalid_json_is_malformed() {
        let stage = JsonBodyParser::new(1024);
        let mut ctx = MiddlewareContext::new();
        let response = stage
            .process(&mut ctx, request(Method::PATCH, "{\"title\":"), ok())
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.raised_error().is_some());
    }

    #[tokio::test]
    async fn test_over_limit_raises_413() {
        let stage = JsonBodyParser::new(4);
        let mut ctx = MiddlewareContext::new();
        let response = stage
            .process(&mut ctx, request(Method::POST, r#"{"title":"Emma"}"#), ok())
            .await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_empty_body_and_reads_pass() {
        let stage = JsonBodyParser::new(1024);
        let mut ctx = MiddlewareContext::new();
        let response = stage.process(&mut ctx, request(Method::POST, ""), ok()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(ctx.body().is_none());

        let response = stage.process(&mut ctx, request(Method::GET, "junk"), ok()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
