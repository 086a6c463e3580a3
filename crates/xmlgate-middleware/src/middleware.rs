//! Core middleware trait and types.
//!
//! This module defines the [`Middleware`] trait that all adapter stages
//! implement. A stage sees the request on the way in and the response on the
//! way out; it short-circuits by returning its own response without calling
//! [`Next::run`].
//!
//! # Example
//!
//! ```
//! use xmlgate_middleware::{BoxFuture, Middleware, Next, Request, Response};
//! use xmlgate_middleware::context::MiddlewareContext;
//!
//! struct LoggingMiddleware;
//!
//! impl Middleware for LoggingMiddleware {
//!     fn name(&self) -> &'static str {
//!         "logging"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut MiddlewareContext,
//!         request: Request,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, Response> {
//!         Box::pin(async move {
//!             tracing::debug!(request_id = %ctx.request_id(), "request");
//!             let response = next.run(ctx, request).await;
//!             tracing::debug!(status = %response.status(), "response");
//!             response
//!         })
//!     }
//! }
//! ```

use crate::context::MiddlewareContext;
use crate::types::{Request, Response};

pub use xmlgate_core::BoxFuture;

/// The core middleware trait.
///
/// # Invariants
///
/// - A stage calls `next.run()` at most once
/// - A stage never alters a response it did not produce unless that is its
///   sole job (the error stage)
pub trait Middleware: Send + Sync + 'static {
    /// Returns the unique name of this stage.
    ///
    /// This name is used for logging and for [`crate::Pipeline::stage_names`].
    fn name(&self) -> &'static str;

    /// Processes the request through this stage.
    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response>;
}

/// Terminal handler invoked after the last stage.
pub type Handler<'a> =
    Box<dyn FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'a>;

/// Callback to invoke the next stage in the chain.
///
/// Consumed by [`Next::run`], so it can be called at most once.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    Handler(Handler<'a>),
}

impl<'a> Next<'a> {
    /// Creates a `Next` that invokes `middleware`, then `next`.
    pub(crate) fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    /// Creates a terminal `Next` that invokes the handler.
    pub(crate) fn handler<F>(f: F) -> Self
    where
        F: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'a,
    {
        Self {
            inner: NextInner::Handler(Box::new(f)),
        }
    }

    /// Invokes the next stage or the terminal handler.
    pub async fn run(self, ctx: &mut MiddlewareContext, request: Request) -> Response {
        match self.inner {
            NextInner::Chain { middleware, next } => middleware.process(ctx, request, *next).await,
            NextInner::Handler(handler) => handler(ctx, request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{empty_body, ResponseExt};
    use http::StatusCode;

    struct Visit(&'static str);

    impl Middleware for Visit {
        fn name(&self) -> &'static str {
            self.0
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut MiddlewareContext,
            request: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async move {
                let mut seen = ctx.remove_extension::<Vec<&'static str>>().unwrap_or_default();
                seen.push(self.0);
                ctx.set_extension(seen);
                next.run(ctx, request).await
            })
        }
    }

    struct ShortCircuit;

    impl Middleware for ShortCircuit {
        fn name(&self) -> &'static str {
            "short_circuit"
        }

        fn process<'a>(
            &'a self,
            _ctx: &'a mut MiddlewareContext,
            _request: Request,
            _next: Next<'a>,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async { Response::empty(StatusCode::NO_CONTENT) })
        }
    }

    fn request() -> Request {
        http::Request::builder().uri("/").body(empty_body()).unwrap()
    }

    #[tokio::test]
    async fn test_next_handler() {
        let mut ctx = MiddlewareContext::new();
        let next = Next::handler(|_ctx, _req| Box::pin(async { Response::empty(StatusCode::OK) }));
        let response = next.run(&mut ctx, request()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_middleware_chain_order() {
        let first = Visit("first");
        let second = Visit("second");
        let mut ctx = MiddlewareContext::new();

        let handler = Next::handler(|_ctx, _req| Box::pin(async { Response::empty(StatusCode::OK) }));
        let chain = Next::new(&first, Next::new(&second, handler));

        let response = chain.run(&mut ctx, request()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            ctx.get_extension::<Vec<&'static str>>().unwrap(),
            &vec!["first", "second"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_rest() {
        let stop = ShortCircuit;
        let after = Visit("after");
        let mut ctx = MiddlewareContext::new();

        let handler = Next::handler(|_ctx, _req| Box::pin(async { Response::empty(StatusCode::OK) }));
        let chain = Next::new(&stop, Next::new(&after, handler));

        let response = chain.run(&mut ctx, request()).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(!ctx.has_extension::<Vec<&'static str>>());
    }
}
