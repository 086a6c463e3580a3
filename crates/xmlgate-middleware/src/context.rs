//! Middleware context types.
//!
//! The [`MiddlewareContext`] carries per-request state through the pipeline:
//! the request ID, the transcoded or parsed body, the resolved target and
//! typed extensions such as the pending operation result.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::time::Instant;

use serde_json::Value;
use xmlgate_core::{RequestId, ResolvedTarget};

/// Context that flows through the adapter pipeline.
///
/// Stages enrich the context additively: the transcoder stores the document
/// it produced, the body parser the normalized body, the resolver the target.
///
/// # Example
///
/// ```
/// use xmlgate_middleware::context::MiddlewareContext;
/// use xmlgate_core::ResolvedTarget;
///
/// let mut ctx = MiddlewareContext::new();
/// ctx.set_target(ResolvedTarget::collection("Books"));
///
/// assert_eq!(ctx.target().and_then(|t| t.entity.as_deref()), Some("Books"));
/// ```
#[derive(Debug)]
pub struct MiddlewareContext {
    /// Unique identifier for this request.
    request_id: RequestId,

    /// When the request started processing.
    started_at: Instant,

    /// Request body as JSON, once transcoded or parsed.
    body: Option<Value>,

    /// The entity, key or operation the request addresses.
    target: Option<ResolvedTarget>,

    /// Type-erased extension data.
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Default for MiddlewareContext {
    fn default() -> Self {
        Self::new()
    }
}

impl MiddlewareContext {
    /// Creates a new middleware context with a fresh request ID.
    #[must_use]
    pub fn new() -> Self {
        Self::with_request_id(RequestId::new())
    }

    /// Creates a context with a specific request ID.
    ///
    /// Useful when the request ID was provided by an upstream proxy.
    #[must_use]
    pub fn with_request_id(request_id: RequestId) -> Self {
        Self {
            request_id,
            started_at: Instant::now(),
            body: None,
            target: None,
            extensions: HashMap::new(),
        }
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns when the request started processing.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Returns the request body as JSON, if any stage produced it.
    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Stores the request body.
    pub fn set_body(&mut self, body: Value) {
        self.body = Some(body);
    }

    /// Takes the request body out of the context.
    pub fn take_body(&mut self) -> Option<Value> {
        self.body.take()
    }

    /// Returns the resolved target, if the resolver ran.
    #[must_use]
    pub fn target(&self) -> Option<&ResolvedTarget> {
        self.target.as_ref()
    }

    /// Stores the resolved target.
    pub fn set_target(&mut self, target: ResolvedTarget) {
        self.target = Some(target);
    }

    /// Stores a typed extension value.
    ///
    /// # Example
    ///
    /// ```
    /// use xmlgate_middleware::context::MiddlewareContext;
    ///
    /// struct Attempt(u32);
    ///
    /// let mut ctx = MiddlewareContext::new();
    /// ctx.set_extension(Attempt(1));
    /// assert_eq!(ctx.get_extension::<Attempt>().unwrap().0, 1);
    /// ```
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<T>())
    }

    /// Retrieves a mutable typed extension value.
    pub fn get_extension_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.extensions
            .get_mut(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_mut::<T>())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    /// Returns `true` if an extension of type `T` is stored.
    #[must_use]
    pub fn has_extension<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.contains_key(&TypeId::of::<T>())
    }
}
