//! Configuration section types.

use serde::{Deserialize, Serialize};
use xmlgate_core::AdapterMode;

pub use xmlgate_telemetry::LogFormat;

/// Server configuration section.
///
/// # Example
///
/// ```
/// use xmlgate_config::ServerConfig;
///
/// let config = ServerConfig {
///     http_addr: "127.0.0.1:4004".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(config.mount_path, "/xml");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// HTTP bind address.
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Path prefix the adapter is mounted under.
    #[serde(default = "default_mount_path")]
    pub mount_path: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Per-request deadline in milliseconds; 0 disables it.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Maximum number of concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// HTTP/1 keep-alive.
    #[serde(default = "default_true")]
    pub keep_alive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            mount_path: default_mount_path(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            request_timeout_ms: default_request_timeout(),
            max_connections: default_max_connections(),
            keep_alive: true,
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:4004".to_string()
}

fn default_mount_path() -> String {
    "/xml".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    30000
}

fn default_max_connections() -> u32 {
    10000
}

/// Adapter pipeline section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AdapterConfig {
    /// Register the error handler stage.
    #[serde(default = "default_true")]
    pub error_handler: bool,

    /// `full_dispatch` or `passthrough`.
    #[serde(default)]
    pub mode: AdapterMode,

    /// Limit for accumulated request bodies in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Send 5xx error messages to clients.
    #[serde(default)]
    pub expose_internal_errors: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            error_handler: true,
            mode: AdapterMode::default(),
            max_body_bytes: default_max_body_bytes(),
            expose_internal_errors: false,
        }
    }
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Record metrics and serve them.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics listener address.
    #[serde(default = "default_metrics_addr")]
    pub addr: String,

    /// Bucket bounds for the request duration histogram.
    #[serde(default = "default_histogram_buckets")]
    pub histogram_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: default_metrics_addr(),
            histogram_buckets: default_histogram_buckets(),
        }
    }
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_histogram_buckets() -> Vec<f64> {
    vec![
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ]
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directives (trace, debug, info, warn, error, or per-target).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include ANSI color codes in pretty output.
    #[serde(default)]
    pub ansi_enabled: bool,

    /// Include source file and line in logs.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            ansi_enabled: false,
            include_location: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Telemetry configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfigSection {
    /// Service name for logs and the metrics `service` label.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Deployment environment.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TelemetryConfigSection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            environment: default_environment(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_service_name() -> String {
    "xmlgate".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

/// Service model section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Model file (`.toml` or `.json`). Required to serve.
    #[serde(default)]
    pub path: Option<String>,

    /// Path segment of the service under the mount path; defaults to the
    /// model's service name.
    #[serde(default)]
    pub service_path: Option<String>,
}

fn default_true() -> bool {
    true
}
