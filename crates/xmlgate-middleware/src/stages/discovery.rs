//! Service discovery middleware.
//!
//! Answers metadata requests at the service root without touching the body
//! or the resource engine:
//!
//! - `HEAD /` → `200`, JSON content type, `content-length: 2`, no body
//! - `GET /` → `200`, `{"entities":[{"name":"Books","url":"Books"}, ...]}`
//!
//! Every other request falls through.

use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Method, StatusCode};
use serde::Serialize;
use xmlgate_core::Catalog;

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::pipeline::Stage;
use crate::types::{set_content_length, Request, Response, ResponseExt, APPLICATION_JSON};

/// One entry of the service root listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityLink {
    /// Entity name.
    pub name: String,
    /// Relative URL of the entity collection.
    pub url: String,
}

/// Middleware serving the service root listing and existence probe.
///
/// The listing is computed once from the catalog at construction.
#[derive(Debug, Clone)]
pub struct DiscoveryMiddleware {
    listing: serde_json::Value,
}

impl DiscoveryMiddleware {
    /// Creates the stage for the entities of `catalog`, in declaration order.
    #[must_use]
    pub fn new(catalog: &dyn Catalog) -> Self {
        let entities: Vec<EntityLink> = catalog
            .entity_names()
            .into_iter()
            .map(|name| EntityLink {
                name: name.to_string(),
                url: name.to_string(),
            })
            .collect();
        Self {
            listing: serde_json::json!({ "entities": entities }),
        }
    }

    fn is_root(request: &Request) -> bool {
        matches!(request.uri().path(), "" | "/")
    }

    fn probe() -> Response {
        let mut response = Response::empty(StatusCode::OK);
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        set_content_length(headers, "{}".len());
        response
    }
}

impl Middleware for DiscoveryMiddleware {
    fn name(&self) -> &'static str {
        Stage::Discovery.name()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if Self::is_root(&request) {
                if request.method() == Method::HEAD {
                    tracing::debug!(request_id = %ctx.request_id(), "service root probe");
                    return Self::probe();
                }
                if request.method() == Method::GET {
                    tracing::debug!(request_id = %ctx.request_id(), "service root listing");
                    return Response::json(StatusCode::OK, &self.listing);
                }
            }
            next.run(ctx, request).await
        })
    }
}
