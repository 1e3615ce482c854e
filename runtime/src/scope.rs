//! RAII operation scope.
//!
//! A scope is opened at the top of every lifecycle operation. When it drops it
//! records latency and an outcome status, whichever way the operation exits.
//! The status starts as [`OperationStatus::Error`], so an early `?` return or
//! a cancelled future is counted as a failure without extra bookkeeping.

use reporting_core::report::ReportId;
use reporting_core::telemetry::{Operation, OperationStatus, Telemetry};
use std::sync::Arc;
use std::time::Instant;
use tracing::Span;

/// Timer, span, and pending outcome for one lifecycle call.
pub struct OperationScope {
    operation: Operation,
    telemetry: Arc<dyn Telemetry>,
    span: Span,
    started: Instant,
    status: OperationStatus,
}

impl OperationScope {
    /// Open a scope and its span.
    #[must_use]
    pub fn open(telemetry: Arc<dyn Telemetry>, operation: Operation) -> Self {
        let span = telemetry.start_span(operation);
        Self {
            operation,
            telemetry,
            span,
            started: Instant::now(),
            status: OperationStatus::Error,
        }
    }

    /// The span the operation should be instrumented with.
    #[must_use]
    pub const fn span(&self) -> &Span {
        &self.span
    }

    /// The operation this scope measures.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.operation
    }

    /// Attach the affected report id to the span.
    pub fn record_report_id(&self, id: &ReportId) {
        self.span.record("report_id", id.as_str());
    }

    /// Mark the operation as successful.
    pub fn succeed(&mut self) {
        self.status = OperationStatus::Success;
    }

    /// Mark the operation as targeting an unknown id.
    pub fn not_found(&mut self) {
        self.status = OperationStatus::NotFound;
    }

    /// Set the status from an optional result.
    pub fn found<T>(&mut self, value: Option<&T>) {
        self.status = if value.is_some() {
            OperationStatus::Success
        } else {
            OperationStatus::NotFound
        };
    }
}

impl Drop for OperationScope {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        self.span.record("outcome", self.status.as_str());
        self.telemetry.record_duration(self.operation, elapsed);
        self.telemetry.record_operation(self.operation, self.status);
        tracing::debug!(
            parent: &self.span,
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            elapsed_ms = elapsed.as_millis(),
            "Operation finished"
        );
    }
}
