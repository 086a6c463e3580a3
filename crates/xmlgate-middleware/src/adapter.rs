//! The XML adapter.
//!
//! [`XmlAdapter`] composes the stage pipeline for one service from its
//! catalog, its resource engine and the adapter settings. The mode decides
//! which stages are registered:
//!
//! - [`AdapterMode::FullDispatch`]: all nine stages; the built-in parser,
//!   resolver and dispatcher call the engine
//! - [`AdapterMode::Passthrough`]: discovery, error handler, guards and
//!   transcoder; the transcoded JSON request goes to a host-supplied
//!   downstream handler
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use xmlgate_core::fixtures::{bookshop_engine, bookshop_model};
//! use xmlgate_middleware::XmlAdapter;
//!
//! let adapter = XmlAdapter::builder(Arc::new(bookshop_model()))
//!     .engine(Arc::new(bookshop_engine()))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(adapter.stage_names().len(), 9);
//! assert_eq!(adapter.stage_names()[1], "error_handler");
//! ```

use std::sync::Arc;

use thiserror::Error;
use tracing::Instrument;
use xmlgate_core::{AdapterError, AdapterMode, Catalog, RequestId, ResourceEngine};

use crate::context::MiddlewareContext;
use crate::middleware::BoxFuture;
use crate::pipeline::Pipeline;
use crate::stages::{
    ContentTypeGuard, DiscoveryMiddleware, Dispatcher, ErrorHandlerMiddleware, JsonBodyParser,
    Materializer, PathResolver, XmlTranscoderMiddleware,
};
use crate::types::{Request, Response, ResponseExt};

/// Default limit for accumulated request bodies (1 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Host handler receiving transcoded requests in passthrough mode.
pub type Downstream = Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>;

/// Errors building an adapter.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    /// Full-dispatch mode without a resource engine.
    #[error("full-dispatch mode requires a resource engine")]
    MissingEngine,

    /// Passthrough mode without a downstream handler.
    #[error("passthrough mode requires a downstream handler")]
    MissingDownstream,
}

/// Adapter settings, usually taken from the `[adapter]` configuration
/// section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterSettings {
    /// Pipeline composition.
    pub mode: AdapterMode,
    /// Register the error handler stage.
    pub error_handler: bool,
    /// Limit for accumulated request bodies.
    pub max_body_bytes: usize,
    /// Send 5xx messages to clients.
    pub expose_internal_errors: bool,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            mode: AdapterMode::FullDispatch,
            error_handler: true,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            expose_internal_errors: false,
        }
    }
}

/// XML protocol adapter for one service.
pub struct XmlAdapter {
    service: String,
    settings: AdapterSettings,
    pipeline: Pipeline,
    downstream: Option<Downstream>,
}

impl std::fmt::Debug for XmlAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlAdapter")
            .field("service", &self.service)
            .field("settings", &self.settings)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl XmlAdapter {
    /// Starts building an adapter for `catalog`.
    #[must_use]
    pub fn builder(catalog: Arc<dyn Catalog>) -> XmlAdapterBuilder {
        XmlAdapterBuilder::new(catalog)
    }

    /// Returns the service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Returns the adapter settings.
    #[must_use]
    pub const fn settings(&self) -> &AdapterSettings {
        &self.settings
    }

    /// Returns the stage names in registration order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.pipeline.stage_names()
    }

    /// Handles one request with a fresh context.
    pub async fn handle(&self, request: Request) -> Response {
        let mut ctx = MiddlewareContext::new();
        self.handle_with(&mut ctx, request).await
    }

    /// Handles one request with a request ID supplied by the host.
    pub async fn handle_with_id(&self, request_id: RequestId, request: Request) -> Response {
        let mut ctx = MiddlewareContext::with_request_id(request_id);
        self.handle_with(&mut ctx, request).await
    }

    /// Handles one request, keeping the caller's context.
    pub async fn handle_with(&self, ctx: &mut MiddlewareContext, request: Request) -> Response {
        let method = request.method().clone();
        let span = tracing::info_span!(
            "xml_adapter",
            service = %self.service,
            request_id = %ctx.request_id(),
            method = %method,
            path = %request.uri().path(),
        );

        let response = async {
            let downstream = self.downstream.clone();
            self.pipeline
                .process_with(ctx, request, move |_ctx, request| {
                    let terminal: BoxFuture<'static, Response> = match downstream {
                        Some(downstream) => downstream(request),
                        None => Box::pin(async {
                            Response::raised(AdapterError::internal("pipeline ended without a response"))
                        }),
                    };
                    terminal
                })
                .await
        }
        .instrument(span.clone())
        .await;

        let status = response.status();
        let elapsed = ctx.elapsed();
        metrics::counter!(
            "xmlgate_requests_total",
            "method" => method.to_string(),
            "status" => status.as_u16().to_string()
        )
        .increment(1);
        metrics::histogram!("xmlgate_request_duration_seconds", "method" => method.to_string())
            .record(elapsed.as_secs_f64());
        span.in_scope(|| {
            tracing::debug!(
                status = status.as_u16(),
                duration_ms = %elapsed.as_millis(),
                aborted = response.is_aborted(),
                "request completed"
            );
        });
        response
    }
}

/// Builder for [`XmlAdapter`].
pub struct XmlAdapterBuilder {
    catalog: Arc<dyn Catalog>,
    engine: Option<Arc<dyn ResourceEngine>>,
    downstream: Option<Downstream>,
    settings: AdapterSettings,
}

impl XmlAdapterBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self {
            catalog,
            engine: None,
            downstream: None,
            settings: AdapterSettings::default(),
        }
    }

    /// Sets the resource engine used in full-dispatch mode.
    #[must_use]
    pub fn engine(mut self, engine: Arc<dyn ResourceEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Sets the downstream handler used in passthrough mode.
    #[must_use]
    pub fn downstream<F>(mut self, downstream: F) -> Self
    where
        F: Fn(Request) -> BoxFuture<'static, Response> + Send + Sync + 'static,
    {
        self.downstream = Some(Arc::new(downstream));
        self
    }

    /// Replaces all settings.
    #[must_use]
    pub fn settings(mut self, settings: AdapterSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the mode.
    #[must_use]
    pub fn mode(mut self, mode: AdapterMode) -> Self {
        self.settings.mode = mode;
        self
    }

    /// Enables or disables the error handler stage.
    #[must_use]
    pub fn error_handler(mut self, enabled: bool) -> Self {
        self.settings.error_handler = enabled;
        self
    }

    /// Sets the body size limit.
    #[must_use]
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.settings.max_body_bytes = limit;
        self
    }

    /// Sets whether 5xx messages reach clients.
    #[must_use]
    pub fn expose_internal_errors(mut self, expose: bool) -> Self {
        self.settings.expose_internal_errors = expose;
        self
    }

    /// Builds the adapter.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] when the collaborator required by the mode is
    /// missing.
    pub fn build(self) -> Result<XmlAdapter, BuildError> {
        let settings = self.settings;
        let full_dispatch = settings.mode == AdapterMode::FullDispatch;

        let mut builder = Pipeline::builder()
            .stage(DiscoveryMiddleware::new(self.catalog.as_ref()))
            .stage_if(
                settings.error_handler,
                ErrorHandlerMiddleware::new().expose_internal_errors(settings.expose_internal_errors),
            )
            .stage(ContentTypeGuard::xml())
            .stage(XmlTranscoderMiddleware::new(settings.max_body_bytes))
            .stage(ContentTypeGuard::json());

        let downstream = if full_dispatch {
            let engine = self.engine.ok_or(BuildError::MissingEngine)?;
            builder = builder
                .stage(JsonBodyParser::new(settings.max_body_bytes))
                .stage(PathResolver::new(self.catalog.clone()))
                .stage(Dispatcher::new(engine))
                .stage(Materializer::new(self.catalog.clone()));
            None
        } else {
            Some(self.downstream.ok_or(BuildError::MissingDownstream)?)
        };

        let adapter = XmlAdapter {
            service: self.catalog.service_name().to_string(),
            settings,
            pipeline: builder.build(),
            downstream,
        };
        tracing::debug!(
            service = %adapter.service,
            mode = %settings.mode,
            stages = ?adapter.stage_names(),
            "xml adapter built"
        );
        Ok(adapter)
    }
}
