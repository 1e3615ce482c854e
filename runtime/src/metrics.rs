//! Prometheus metrics for the report write path.
//!
//! [`MetricsServer`] installs the global Prometheus recorder and hands out a
//! render handle for the `/metrics` route. [`PrometheusTelemetry`] implements
//! the [`Telemetry`] port on top of the `metrics` facade.
//!
//! | metric | kind | labels |
//! |--------|------|--------|
//! | `report_operations_total` | counter | `operation`, `status` |
//! | `report_operation_duration_seconds` | histogram | `operation` |
//! | `report_secondary_failures_total` | counter | `operation`, `step` |
//! | `report_ingested_events_total` | counter | `topic`, `outcome` |
//!
//! # Example
//!
//! ```rust,no_run
//! use reporting_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new();
//! server.start()?;
//! let body = server.render();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use reporting_core::telemetry::{
    IngestionOutcome, Operation, OperationStatus, SecondaryStep, Telemetry,
};
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Latency buckets for every `*_duration_seconds` histogram.
const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Prometheus recorder owner.
///
/// It binds no listener of its own. The rendered text is served by the web
/// crate's `/metrics` route.
#[derive(Default)]
pub struct MetricsServer {
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a metrics server with no recorder installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Register metric descriptions and install the global recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the exporter cannot be built or installed.
    /// A recorder that is already installed (common in tests) is not an error;
    /// the handle then stays `None`.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                DURATION_BUCKETS,
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if the recorder is not ours.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "report_operations_total",
        "Total number of report lifecycle operations by outcome"
    );
    describe_histogram!(
        "report_operation_duration_seconds",
        "Time taken by report lifecycle operations"
    );
    describe_counter!(
        "report_secondary_failures_total",
        "Total number of swallowed cache, publish, and peer failures"
    );
    describe_counter!(
        "report_ingested_events_total",
        "Total number of inbound events by outcome"
    );
}

/// [`Telemetry`] backed by the global `metrics` recorder.
#[derive(Clone, Copy, Debug, Default)]
pub struct PrometheusTelemetry;

impl Telemetry for PrometheusTelemetry {
    fn record_operation(&self, operation: Operation, status: OperationStatus) {
        counter!(
            "report_operations_total",
            "operation" => operation.as_str(),
            "status" => status.as_str()
        )
        .increment(1);
    }

    fn record_duration(&self, operation: Operation, elapsed: Duration) {
        histogram!(
            "report_operation_duration_seconds",
            "operation" => operation.as_str()
        )
        .record(elapsed.as_secs_f64());
    }

    fn record_secondary_failure(&self, operation: Operation, step: SecondaryStep) {
        counter!(
            "report_secondary_failures_total",
            "operation" => operation.as_str(),
            "step" => step.as_str()
        )
        .increment(1);
    }

    fn record_ingestion(&self, topic: &str, outcome: IngestionOutcome) {
        counter!(
            "report_ingested_events_total",
            "topic" => topic.to_string(),
            "outcome" => outcome.as_str()
        )
        .increment(1);
    }
}
