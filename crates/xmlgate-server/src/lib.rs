//! # xmlgate Server
//!
//! HTTP host for the xmlgate XML adapter.
//!
//! - HTTP/1.1 via hyper, one task per connection
//! - One-shot service mount under a configurable path (default `/xml`)
//! - `/health` and `/ready` probes
//! - Prometheus endpoint on a separate listener
//! - Graceful shutdown on SIGINT and SIGTERM
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use xmlgate_core::fixtures::{bookshop_engine, bookshop_model};
//! use xmlgate_middleware::XmlAdapter;
//! use xmlgate_server::{Server, ServiceRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = XmlAdapter::builder(Arc::new(bookshop_model()))
//!         .engine(Arc::new(bookshop_engine()))
//!         .build()?;
//!
//!     let registry = ServiceRegistry::new();
//!     registry.register("CatalogService", adapter)?;
//!
//!     Server::builder(registry.mount("/xml")?)
//!         .http_addr("127.0.0.1:4004")
//!         .build()?
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/xmlgate-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod bootstrap;
mod error;
mod health;
mod registry;
mod server;
mod shutdown;

pub use bootstrap::{adapter_settings, mount_from_config, StartupError};
pub use error::ServerError;
pub use health::{HealthCheck, HealthStatus, ReadinessCheck, ReadinessStatus};
pub use registry::{MountedServices, Route, RouteMatch, ServiceRegistry};
pub use server::{Server, ServerBuilder, REQUEST_ID_HEADER};
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownSignal};
