//! Response materialization.
//!
//! Turns the [`PendingResult`] left by the dispatcher into the wire response:
//!
//! 1. binary fields of the result are base64-encoded, using the definition
//!    of the custom operation if one was called, otherwise of the addressed
//!    entity
//! 2. the status is the handler's (default `200`) unless the handler already
//!    set a non-200 status on the draft
//! 3. `location` is added only if the draft does not carry one
//! 4. `HEAD` gets a JSON content type and the length of the JSON the `GET`
//!    would have sent, without body bytes; numbers are sent as plain text,
//!    a missing or null result as an empty body, anything else as JSON

use std::sync::Arc;

use http::header::{HeaderValue, CONTENT_TYPE, LOCATION};
use http::{Method, StatusCode};
use xmlgate_core::{encode_binary_fields, AdapterError, Catalog, Document};

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::pipeline::Stage;
use crate::stages::dispatch::PendingResult;
use crate::types::{set_content_length, Request, Response, ResponseExt, APPLICATION_JSON};

/// Middleware building the response from the engine outcome.
#[derive(Clone)]
pub struct Materializer {
    catalog: Arc<dyn Catalog>,
}

impl std::fmt::Debug for Materializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Materializer")
            .field("service", &self.catalog.service_name())
            .finish()
    }
}

impl Materializer {
    /// Creates the stage for `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    /// Builds the response for `pending`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::NotFound`] when the definition identifier
    /// names a bound operation of an unknown entity.
    pub fn materialize(
        &self,
        method: &Method,
        definition_id: Option<&str>,
        pending: PendingResult,
    ) -> Result<Response, AdapterError> {
        let PendingResult { outcome, draft, .. } = pending;
        let mut result = outcome.result;

        if let (Some(document), Some(id)) = (result.as_mut(), definition_id) {
            if let Some(definition) = self.catalog.definition(id)? {
                encode_binary_fields(document, definition, self.catalog.as_ref());
            }
        }

        let (draft_status, draft_headers) = draft.into_parts();
        let status = if draft_status == StatusCode::OK {
            outcome.status.unwrap_or(StatusCode::OK)
        } else {
            draft_status
        };

        let mut response = if *method == Method::HEAD {
            head_response(status, result.as_ref())
        } else {
            body_response(status, result.as_ref())
        };

        let headers = response.headers_mut();
        headers.extend(draft_headers);
        if let Some(location) = outcome.location {
            if !headers.contains_key(LOCATION) {
                match HeaderValue::try_from(location) {
                    Ok(value) => {
                        headers.insert(LOCATION, value);
                    }
                    Err(err) => tracing::warn!(error = %err, "dropping invalid location header"),
                }
            }
        }
        Ok(response)
    }
}

fn head_response(status: StatusCode, result: Option<&Document>) -> Response {
    let len = result.map_or(0, |doc| doc.to_json().to_string().len());
    let mut response = Response::empty(status);
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    set_content_length(headers, len);
    response
}

fn body_response(status: StatusCode, result: Option<&Document>) -> Response {
    match result {
        None | Some(Document::Null) => Response::empty(status),
        Some(Document::Number(n)) => Response::text(status, n.to_string()),
        Some(doc) => Response::json(status, &doc.to_json()),
    }
}

impl Middleware for Materializer {
    fn name(&self) -> &'static str {
        Stage::Materializer.name()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let Some(pending) = ctx.remove_extension::<PendingResult>() else {
                return next.run(ctx, request).await;
            };
            let kind = pending.kind;
            let definition_id = ctx.target().and_then(|t| t.definition_id()).map(ToString::to_string);

            match self.materialize(request.method(), definition_id.as_deref(), pending) {
                Ok(response) => {
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        operation = %kind,
                        status = %response.status(),
                        "materialized response"
                    );
                    response
                }
                Err(err) => Response::raised(err),
            }
        })
    }
}
