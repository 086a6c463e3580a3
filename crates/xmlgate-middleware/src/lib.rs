//! # xmlgate Middleware
//!
//! The XML adapter pipeline: clients send XML to a resource engine that
//! speaks JSON.
//!
//! ## Pipeline Stages
//!
//! ```text
//! Request → Discovery → ErrorHandler → XmlGuard → Transcoder → JsonGuard
//!                                                                  ↓
//!           Materializer ← Dispatcher ← Resolver ← BodyParser ←────┘
//! ```
//!
//! | Stage | Middleware        | Purpose                                    |
//! |-------|-------------------|--------------------------------------------|
//! | 1     | Discovery         | Service root listing and `HEAD /` probe    |
//! | 2     | Error handler     | Raised errors to JSON envelopes            |
//! | 3     | XML content type  | Rejects bad `content-type` before reading  |
//! | 4     | XML transcoder    | XML body to JSON document                  |
//! | 5     | JSON content type | Re-validates the transcoded request        |
//! | 6     | Body parser       | Body size limit and shape checks           |
//! | 7     | Resolver          | Path to entity, key, navigation, operation |
//! | 8     | Dispatcher        | Resource engine call                       |
//! | 9     | Materializer      | Status, headers, base64, serialization     |
//!
//! The error handler is registered second so it wraps every stage that can
//! raise, and acts last on the way out. Stages 6 to 9 are replaced by a
//! downstream handler in passthrough mode.
//!
//! ## Example
//!
//! ```
//! use xmlgate_middleware::pipeline::Stage;
//!
//! let stages = Stage::all();
//! assert_eq!(stages.len(), 9);
//! assert_eq!(stages[0].name(), "discovery");
//! assert_eq!(stages[8].name(), "materializer");
//! ```

#![doc(html_root_url = "https://docs.rs/xmlgate-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod adapter;
pub mod context;
pub mod middleware;
pub mod pipeline;
pub mod stages;
pub mod types;

pub use adapter::{AdapterSettings, BuildError, Downstream, XmlAdapter, XmlAdapterBuilder, DEFAULT_MAX_BODY_BYTES};
pub use context::MiddlewareContext;
pub use middleware::{BoxFuture, Middleware, Next};
pub use pipeline::{Pipeline, PipelineBuilder, Stage};
pub use types::{
    empty_body, full_body, Aborted, Body, BodyError, RaisedError, Request, Response, ResponseExt,
    APPLICATION_JSON, APPLICATION_XML,
};
