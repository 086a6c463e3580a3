//! Engine dispatch.
//!
//! Picks the engine call for the resolved target and method, awaits it and
//! hands the outcome to the materializer as a [`PendingResult`].
//!
//! Three outcomes end the request here:
//!
//! - the engine raised an error, which is passed on as a raised response
//! - the handler finalized the response itself, which is sent unchanged
//! - the handler produced neither a result nor a status, answered with `204`

use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use xmlgate_core::{
    AdapterError, EngineRequest, OperationKind, OperationResult, ResourceEngine, ResponseDraft,
};

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::pipeline::Stage;
use crate::types::{Request, Response, ResponseExt};

/// Engine outcome waiting to be materialized.
#[derive(Debug)]
pub struct PendingResult {
    /// The operation that produced the outcome.
    pub kind: OperationKind,
    /// Result, status and location returned by the handler.
    pub outcome: OperationResult,
    /// Status and headers the handler set on the response.
    pub draft: ResponseDraft,
}

/// Middleware calling the resource engine.
#[derive(Clone)]
pub struct Dispatcher {
    engine: Arc<dyn ResourceEngine>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher over `engine`.
    #[must_use]
    pub fn new(engine: Arc<dyn ResourceEngine>) -> Self {
        Self { engine }
    }
}

fn finalized_response(response: http::Response<Bytes>) -> Response {
    let (parts, body) = response.into_parts();
    http::Response::from_parts(parts, Full::new(body))
}

impl Middleware for Dispatcher {
    fn name(&self) -> &'static str {
        Stage::Dispatcher.name()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let Some(target) = ctx.target().cloned() else {
                return Response::raised(AdapterError::internal("request target was not resolved"));
            };
            let Some(kind) = OperationKind::for_request(request.method(), &target) else {
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    method = %request.method(),
                    "no engine operation for method"
                );
                return Response::raised(AdapterError::method_not_allowed(request.method().as_str()));
            };

            let engine_request = EngineRequest {
                kind,
                method: request.method().clone(),
                target,
                body: ctx.body().cloned(),
                headers: request.headers().clone(),
                request_id: ctx.request_id(),
            };
            metrics::counter!("xmlgate_engine_calls_total", "operation" => kind.as_str()).increment(1);
            tracing::debug!(
                request_id = %ctx.request_id(),
                operation = %kind,
                definition = ?engine_request.target.definition_id(),
                "dispatching to engine"
            );

            let mut draft = ResponseDraft::new();
            let outcome = self.engine.execute(&engine_request, &mut draft).await;

            if let Some(response) = draft.take_finalized() {
                tracing::debug!(request_id = %ctx.request_id(), "handler finalized the response");
                return finalized_response(response);
            }

            match outcome {
                Err(err) => {
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        operation = %kind,
                        error = %err,
                        "engine raised an error"
                    );
                    Response::raised(err)
                }
                Ok(Some(outcome)) if !outcome.is_empty() => {
                    ctx.set_extension(PendingResult {
                        kind,
                        outcome,
                        draft,
                    });
                    next.run(ctx, request).await
                }
                Ok(_) => {
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        operation = %kind,
                        "handler produced no result"
                    );
                    Response::empty(StatusCode::NO_CONTENT)
                }
            }
        })
    }
}
