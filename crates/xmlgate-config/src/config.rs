//! Main configuration type.
//!
//! This module provides the top-level [`XmlGateConfig`] struct and its builder.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use xmlgate_telemetry::{LogConfig, TelemetryConfig};

use crate::{AdapterConfig, ConfigError, LogFormat, ModelConfig, ServerConfig, TelemetryConfigSection};

/// Complete xmlgate configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use xmlgate_config::XmlGateConfig;
///
/// let config = XmlGateConfig::default();
/// assert!(config.adapter.error_handler);
/// assert_eq!(config.server.mount_path, "/xml");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct XmlGateConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Adapter pipeline configuration.
    #[serde(default)]
    pub adapter: AdapterConfig,

    /// Telemetry configuration (metrics, logging).
    #[serde(default)]
    pub telemetry: TelemetryConfigSection,

    /// Service model configuration.
    #[serde(default)]
    pub model: ModelConfig,
}

impl XmlGateConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> XmlGateConfigBuilder {
        XmlGateConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.http_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }

        let mount = &self.server.mount_path;
        if !mount.starts_with('/') {
            return Err(ConfigError::invalid_value(
                "server.mount_path",
                "must start with '/'",
            ));
        }
        if mount.len() > 1 && mount.ends_with('/') {
            return Err(ConfigError::invalid_value(
                "server.mount_path",
                "must not end with '/'",
            ));
        }
        if mount.contains(['?', '#']) {
            return Err(ConfigError::invalid_value(
                "server.mount_path",
                "must be a plain path",
            ));
        }

        if self.adapter.max_body_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "adapter.max_body_bytes",
                "must be greater than zero",
            ));
        }

        let metrics = &self.telemetry.metrics;
        if metrics.enabled {
            if metrics.addr.parse::<SocketAddr>().is_err() {
                return Err(ConfigError::invalid_value(
                    "telemetry.metrics.addr",
                    format!("invalid socket address: {}", metrics.addr),
                ));
            }
            if metrics.histogram_buckets.is_empty() {
                return Err(ConfigError::invalid_value(
                    "telemetry.metrics.histogram_buckets",
                    "must not be empty",
                ));
            }
        }

        if self.telemetry.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "telemetry.logging.level",
                "must not be empty",
            ));
        }

        if let Some(service_path) = &self.model.service_path {
            if service_path.is_empty() || service_path.contains('/') {
                return Err(ConfigError::invalid_value(
                    "model.service_path",
                    "must be a single non-empty path segment",
                ));
            }
        }

        Ok(())
    }

    /// Development preset: pretty debug logs, internal errors exposed.
    ///
    /// ```
    /// use xmlgate_config::XmlGateConfig;
    ///
    /// let config = XmlGateConfig::development();
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// assert!(config.adapter.expose_internal_errors);
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config.telemetry.logging.ansi_enabled = true;
        config.telemetry.logging.include_location = true;
        config.telemetry.environment = "development".to_string();
        config.adapter.expose_internal_errors = true;
        config
    }

    /// Production preset: JSON info logs, internal errors hidden.
    ///
    /// ```
    /// use xmlgate_config::{LogFormat, XmlGateConfig};
    ///
    /// let config = XmlGateConfig::production();
    /// assert_eq!(config.telemetry.logging.format, LogFormat::Json);
    /// ```
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.telemetry.logging.level = "info".to_string();
        config.telemetry.logging.format = LogFormat::Json;
        config.telemetry.logging.ansi_enabled = false;
        config.telemetry.environment = "production".to_string();
        config.adapter.expose_internal_errors = false;
        config
    }

    /// Telemetry settings in the form the telemetry crate installs.
    #[must_use]
    pub fn telemetry_config(&self) -> TelemetryConfig {
        let section = &self.telemetry;
        let logging = LogConfig {
            enabled: section.logging.enabled,
            level: section.logging.level.clone(),
            format: section.logging.format,
            span_events: false,
            file_line_info: section.logging.include_location,
            include_target: true,
            ansi: section.logging.ansi_enabled,
            service_name: section.service_name.clone(),
        };
        let metrics = xmlgate_telemetry::MetricsConfig {
            enabled: section.metrics.enabled,
            addr: section.metrics.addr.clone(),
            service_name: section.service_name.clone(),
            duration_buckets: section.metrics.histogram_buckets.clone(),
        };

        TelemetryConfig::builder()
            .service_name(&section.service_name)
            .environment(&section.environment)
            .logging(logging)
            .metrics(metrics)
            .build()
    }
}

/// Builder for [`XmlGateConfig`].
#[derive(Debug, Default)]
pub struct XmlGateConfigBuilder {
    server: Option<ServerConfig>,
    adapter: Option<AdapterConfig>,
    telemetry: Option<TelemetryConfigSection>,
    model: Option<ModelConfig>,
}

impl XmlGateConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server configuration.
    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = Some(server);
        self
    }

    /// Set the adapter configuration.
    #[must_use]
    pub fn adapter(mut self, adapter: AdapterConfig) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Set the telemetry configuration.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetryConfigSection) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Set the model configuration.
    #[must_use]
    pub fn model(mut self, model: ModelConfig) -> Self {
        self.model = Some(model);
        self
    }

    /// Build the configuration; unset sections use their defaults.
    #[must_use]
    pub fn build(self) -> XmlGateConfig {
        XmlGateConfig {
            server: self.server.unwrap_or_default(),
            adapter: self.adapter.unwrap_or_default(),
            telemetry: self.telemetry.unwrap_or_default(),
            model: self.model.unwrap_or_default(),
        }
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<XmlGateConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xmlgate_core::AdapterMode;

    fn with_server(server: ServerConfig) -> XmlGateConfig {
        XmlGateConfig::builder().server(server).build()
    }

    fn field_of(err: ConfigError) -> String {
        match err {
            ConfigError::InvalidValue { field, .. } => field,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(XmlGateConfig::default().validate().is_ok());
        assert!(XmlGateConfig::development().validate().is_ok());
        assert!(XmlGateConfig::production().validate().is_ok());
    }

    #[test]
    fn test_builder_keeps_unset_sections_default() {
        let config = XmlGateConfig::builder()
            .adapter(AdapterConfig {
                mode: AdapterMode::Passthrough,
                ..Default::default()
            })
            .build();
        assert_eq!(config.adapter.mode, AdapterMode::Passthrough);
        assert_eq!(config.server, ServerConfig::default());
        assert_eq!(config.model, ModelConfig::default());
    }

    #[test]
    fn test_invalid_http_addr() {
        let config = with_server(ServerConfig {
            http_addr: "localhost".to_string(),
            ..Default::default()
        });
        assert_eq!(field_of(config.validate().unwrap_err()), "server.http_addr");
    }

    #[test]
    fn test_mount_path_rules() {
        for bad in ["xml", "/xml/", "/xml?debug"] {
            let config = with_server(ServerConfig {
                mount_path: bad.to_string(),
                ..Default::default()
            });
            assert_eq!(field_of(config.validate().unwrap_err()), "server.mount_path", "{bad}");
        }
        for good in ["/", "/xml", "/api/xml"] {
            let config = with_server(ServerConfig {
                mount_path: good.to_string(),
                ..Default::default()
            });
            assert!(config.validate().is_ok(), "{good}");
        }
    }

    #[test]
    fn test_zero_body_limit_rejected() {
        let config = XmlGateConfig::builder()
            .adapter(AdapterConfig {
                max_body_bytes: 0,
                ..Default::default()
            })
            .build();
        assert_eq!(field_of(config.validate().unwrap_err()), "adapter.max_body_bytes");
    }

    #[test]
    fn test_metrics_addr_checked_only_when_enabled() {
        let mut config = XmlGateConfig::default();
        config.telemetry.metrics.addr = "nowhere".to_string();
        assert_eq!(field_of(config.validate().unwrap_err()), "telemetry.metrics.addr");

        config.telemetry.metrics.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_service_path_is_one_segment() {
        let config = XmlGateConfig::builder()
            .model(ModelConfig {
                path: None,
                service_path: Some("catalog/v1".to_string()),
            })
            .build();
        assert_eq!(field_of(config.validate().unwrap_err()), "model.service_path");
    }

    #[test]
    fn test_telemetry_config_conversion() {
        let mut config = XmlGateConfig::development();
        config.telemetry.service_name = "bookshop-xml".to_string();
        config.telemetry.metrics.addr = "127.0.0.1:9464".to_string();

        let telemetry = config.telemetry_config();
        assert_eq!(telemetry.service_name, "bookshop-xml");
        assert_eq!(telemetry.logging.format, LogFormat::Pretty);
        assert_eq!(telemetry.logging.level, "debug");
        assert!(telemetry.logging.file_line_info);
        assert_eq!(telemetry.logging.service_name, "bookshop-xml");
        assert_eq!(telemetry.metrics.addr, "127.0.0.1:9464");
        assert_eq!(telemetry.metrics.service_name, "bookshop-xml");
    }
}
