//! Prometheus metrics.
//!
//! The adapter records through the `metrics` facade; [`init_metrics`]
//! installs the Prometheus recorder and [`render_metrics`] produces the text
//! exposition served on the metrics listener.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `xmlgate_requests_total` | Counter | `method`, `status` |
//! | `xmlgate_request_duration_seconds` | Histogram | `method` |
//! | `xmlgate_transcode_failures_total` | Counter | - |
//! | `xmlgate_engine_calls_total` | Counter | `operation` |
//! | `xmlgate_in_flight_requests` | Gauge | - |

use std::sync::OnceLock;

use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Metric names recorded by the adapter and the server.
pub mod names {
    /// Completed requests by method and status.
    pub const REQUESTS_TOTAL: &str = "xmlgate_requests_total";
    /// Pipeline latency by method.
    pub const REQUEST_DURATION_SECONDS: &str = "xmlgate_request_duration_seconds";
    /// Request bodies rejected as invalid XML.
    pub const TRANSCODE_FAILURES_TOTAL: &str = "xmlgate_transcode_failures_total";
    /// Resource engine calls by operation kind.
    pub const ENGINE_CALLS_TOTAL: &str = "xmlgate_engine_calls_total";
    /// Requests currently inside the server.
    pub const IN_FLIGHT_REQUESTS: &str = "xmlgate_in_flight_requests";
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are recorded.
    pub enabled: bool,

    /// Address of the metrics listener (e.g. `0.0.0.0:9090`).
    pub addr: String,

    /// Value of the global `service` label.
    pub service_name: String,

    /// Bucket bounds for the request duration histogram.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: "0.0.0.0:9090".to_string(),
            service_name: "xmlgate".to_string(),
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        }
    }
}

/// Installs the global Prometheus recorder.
///
/// Calling this again after a successful install is a no-op.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidBuckets`] for an empty bucket list and
/// [`TelemetryError::MetricsInit`] if another recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled || METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .add_global_label("service", config.service_name.clone())
        .set_buckets_for_metric(
            Matcher::Full(names::REQUEST_DURATION_SECONDS.to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::InvalidBuckets(e.to_string()))?
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _ = METRICS_HANDLE.set(handle);
    describe_metrics();
    Ok(())
}

/// Renders all metrics in the Prometheus text format.
///
/// Returns `None` until [`init_metrics`] has installed the recorder.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn describe_metrics() {
    describe_counter!(names::REQUESTS_TOTAL, "Requests completed by the XML adapter");
    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Time spent in the adapter pipeline"
    );
    describe_counter!(
        names::TRANSCODE_FAILURES_TOTAL,
        "Request bodies rejected as invalid XML"
    );
    describe_counter!(names::ENGINE_CALLS_TOTAL, "Resource engine calls by operation");
    describe_gauge!(names::IN_FLIGHT_REQUESTS, "Requests currently being processed");
}

/// Holds one slot of the in-flight gauge until dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Increments the in-flight gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!(names::IN_FLIGHT_REQUESTS).increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(names::IN_FLIGHT_REQUESTS).decrement(1.0);
    }
}
