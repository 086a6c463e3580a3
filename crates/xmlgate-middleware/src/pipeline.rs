//! Ordered stage pipeline.
//!
//! A [`Pipeline`] is an ordered list of stages built once at startup and
//! shared by all requests. Each request walks the stages front to back and
//! the response travels back through them in reverse.
//!
//! ## Adapter stage order
//!
//! [`Stage`] names the stages the adapter registers, outermost first:
//!
//! 1. **Discovery** - service root listing and existence probe
//! 2. **Error handler** - renders raised errors (optional)
//! 3. **XML content type** - inbound content-type guard
//! 4. **XML transcoder** - XML body to JSON document
//! 5. **JSON content type** - outbound content-type guard
//! 6. **Body parser** - size limit and structural checks
//! 7. **Resolver** - path to entity, key, navigation or operation
//! 8. **Dispatcher** - calls the resource engine
//! 9. **Materializer** - status, headers, binary encoding, serialization

use std::sync::Arc;

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};

/// A type-erased middleware that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// An ordered middleware pipeline.
///
/// # Example
///
/// ```
/// use xmlgate_middleware::pipeline::Pipeline;
///
/// let pipeline = Pipeline::builder().build();
/// assert_eq!(pipeline.stage_count(), 0);
/// ```
pub struct Pipeline {
    stages: Vec<BoxedMiddleware>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Processes a request through every stage, then `handler`.
    ///
    /// `handler` only runs if every stage calls its `next`.
    pub async fn process<H>(&self, mut ctx: MiddlewareContext, request: Request, handler: H) -> Response
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'static,
    {
        let next = self.build_chain(handler);
        next.run(&mut ctx, request).await
    }

    /// Like [`Pipeline::process`] but keeps the caller's context, so tests
    /// and hosts can inspect what the stages stored.
    pub async fn process_with<H>(
        &self,
        ctx: &mut MiddlewareContext,
        request: Request,
        handler: H,
    ) -> Response
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'static,
    {
        let next = self.build_chain(handler);
        next.run(ctx, request).await
    }

    fn build_chain<'a, H>(&'a self, handler: H) -> Next<'a>
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'a,
    {
        let mut next = Next::handler(handler);
        for middleware in self.stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }
        next
    }

    /// Returns the names of all stages in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|mw| mw.name()).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

/// Builder for constructing a [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<BoxedMiddleware>,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Appends a stage; stages run in the order they are added.
    #[must_use]
    pub fn stage<M: Middleware>(mut self, middleware: M) -> Self {
        self.stages.push(Arc::new(middleware));
        self
    }

    /// Appends a stage only when `enabled` is true.
    #[must_use]
    pub fn stage_if<M: Middleware>(self, enabled: bool, middleware: M) -> Self {
        if enabled {
            self.stage(middleware)
        } else {
            self
        }
    }

    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages,
        }
    }
}

/// Adapter stages, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Service root listing and existence probe.
    Discovery = 1,
    /// Raised-error rendering.
    ErrorHandler = 2,
    /// Inbound content-type guard.
    XmlContentType = 3,
    /// XML to JSON transcoding.
    XmlTranscoder = 4,
    /// Outbound content-type guard.
    JsonContentType = 5,
    /// Body normalization.
    BodyParser = 6,
    /// Path resolution.
    Resolver = 7,
    /// Engine dispatch.
    Dispatcher = 8,
    /// Response materialization.
    Materializer = 9,
}

impl Stage {
    /// Returns the stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::ErrorHandler => "error_handler",
            Self::XmlContentType => "xml_content_type",
            Self::XmlTranscoder => "xml_transcoder",
            Self::JsonContentType => "json_content_type",
            Self::BodyParser => "body_parser",
            Self::Resolver => "resolver",
            Self::Dispatcher => "dispatcher",
            Self::Materializer => "materializer",
        }
    }

    /// Returns all stages in order.
    #[must_use]
    pub const fn all() -> [Stage; 9] {
        [
            Self::Discovery,
            Self::ErrorHandler,
            Self::XmlContentType,
            Self::XmlTranscoder,
            Self::JsonContentType,
            Self::BodyParser,
            Self::Resolver,
            Self::Dispatcher,
            Self::Materializer,
        ]
    }

    /// Returns `true` for stages registered only in full-dispatch mode.
    #[must_use]
    pub const fn is_dispatch_only(self) -> bool {
        (self as u8) >= 6
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{empty_body, ResponseExt};
    use http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OrderTrackingMiddleware {
        name: &'static str,
        counter: Arc<AtomicUsize>,
        order: Arc<std::sync::Mutex<Vec<&'static str>>>,
    }

    impl Middleware for OrderTrackingMiddleware {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut MiddlewareContext,
            request: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async move {
                self.counter.fetch_add(1, Ordering::SeqCst);
                self.order.lock().unwrap().push(self.name);
                next.run(ctx, request).await
            })
        }
    }

    fn request() -> Request {
        http::Request::builder().uri("/Books").body(empty_body()).unwrap()
    }

    #[tokio::test]
    async fn test_pipeline_executes_in_order() {
        let counter = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let stage = |name| OrderTrackingMiddleware {
            name,
            counter: counter.clone(),
            order: order.clone(),
        };

        let pipeline = Pipeline::builder()
            .stage(stage("first"))
            .stage(stage("second"))
            .stage_if(false, stage("skipped"))
            .stage(stage("third"))
            .build();

        assert_eq!(pipeline.stage_names(), vec!["first", "second", "third"]);

        let response = pipeline
            .process(MiddlewareContext::new(), request(), |_ctx, _req| {
                Box::pin(async { Response::empty(StatusCode::OK) })
            })
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_empty_pipeline_runs_handler() {
        let pipeline = Pipeline::builder().build();
        let mut ctx = MiddlewareContext::new();
        let response = pipeline
            .process_with(&mut ctx, request(), |_ctx, _req| {
                Box::pin(async { Response::empty(StatusCode::ACCEPTED) })
            })
            .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[test]
    fn test_stage_ordering() {
        let all = Stage::all();
        assert!(all.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(all[0].name(), "discovery");
        assert_eq!(all[8].name(), "materializer");
    }

    #[test]
    fn test_dispatch_only_stages() {
        assert!(!Stage::JsonContentType.is_dispatch_only());
        assert!(Stage::BodyParser.is_dispatch_only());
        assert!(Stage::Materializer.is_dispatch_only());
    }
}
