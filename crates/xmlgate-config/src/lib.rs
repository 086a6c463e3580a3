//! Typed configuration for xmlgate.
//!
//! - TOML and JSON configuration files
//! - Environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Example
//!
//! ```no_run
//! use xmlgate_config::ConfigLoader;
//!
//! # fn main() -> Result<(), xmlgate_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("xmlgate.toml")?
//!     .with_dotenv()?
//!     .with_env_prefix("XMLGATE")
//!     .load()?;
//!
//! println!("adapter mounted at {}", config.server.mount_path);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:4004"
//! mount_path = "/xml"
//! request_timeout_ms = 30000
//!
//! [adapter]
//! error_handler = true
//! mode = "full_dispatch"
//! max_body_bytes = 1048576
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//!
//! [telemetry.metrics]
//! enabled = true
//! addr = "0.0.0.0:9090"
//!
//! [model]
//! path = "model/bookshop.toml"
//! ```
//!
//! # Environment Variable Overrides
//!
//! `PREFIX__SECTION__KEY`, for example:
//!
//! - `XMLGATE__ADAPTER__ERROR_HANDLER=false`
//! - `XMLGATE__SERVER__MOUNT_PATH=/odata-xml`
//! - `XMLGATE__TELEMETRY__LOGGING__LEVEL=debug`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{XmlGateConfig, XmlGateConfigBuilder};
pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::*;
