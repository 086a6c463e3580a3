//! Adapter stages.
//!
//! Stages in registration order:
//!
//! 1. [`discovery`] - service root listing and existence probe
//! 2. [`error_handler`] - raised-error rendering (optional, acts last)
//! 3. [`content_type`] - `application/xml` guard
//! 4. [`transcode`] - XML body to JSON document
//! 5. [`content_type`] - `application/json` guard
//! 6. [`body_parser`] - body size and shape checks
//! 7. [`resolver`] - path to target
//! 8. [`dispatch`] - resource engine call
//! 9. [`materialize`] - response building
//!
//! Stages 6 to 9 are registered only in full-dispatch mode.

pub mod body_parser;
pub mod content_type;
pub mod discovery;
pub mod dispatch;
pub mod error_handler;
pub mod materialize;
pub mod resolver;
pub mod transcode;

pub use body_parser::JsonBodyParser;
pub use content_type::ContentTypeGuard;
pub use discovery::{DiscoveryMiddleware, EntityLink};
pub use dispatch::{Dispatcher, PendingResult};
pub use error_handler::ErrorHandlerMiddleware;
pub use materialize::Materializer;
pub use resolver::PathResolver;
pub use transcode::{xml_to_json, TranscodeError, Transcoded, XmlTranscoderMiddleware};
