//! Application state shared by every handler.

use metrics_exporter_prometheus::PrometheusHandle;
use reporting_runtime::ReportLifecycle;

/// State cloned into each request.
///
/// [`ReportLifecycle`] is cheap to clone (its ports are `Arc`s), so no extra
/// `Arc` is needed here.
#[derive(Clone)]
pub struct AppState {
    /// Orchestrator behind every report route
    pub lifecycle: ReportLifecycle,
    /// Render handle for `GET /metrics`, when this process owns the recorder
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// State without a metrics endpoint.
    #[must_use]
    pub const fn new(lifecycle: ReportLifecycle) -> Self {
        Self {
            lifecycle,
            metrics: None,
        }
    }

    /// Serve `handle` on `GET /metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
