//! Recording telemetry sink.

use reporting_core::telemetry::{
    IngestionOutcome, Operation, OperationStatus, SecondaryStep, Telemetry,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct Recorded {
    operations: Vec<(Operation, OperationStatus)>,
    durations: Vec<(Operation, Duration)>,
    secondary_failures: Vec<(Operation, SecondaryStep)>,
    ingestions: Vec<(String, IngestionOutcome)>,
}

/// [`Telemetry`] that keeps everything it is told, for assertions.
#[derive(Clone, Debug, Default)]
pub struct RecordingTelemetry {
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingTelemetry {
    /// Empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Finished operations, in order.
    #[must_use]
    pub fn operations(&self) -> Vec<(Operation, OperationStatus)> {
        self.recorded.lock().unwrap().operations.clone()
    }

    /// How many times `operation` finished with `status`.
    #[must_use]
    pub fn count(&self, operation: Operation, status: OperationStatus) -> usize {
        self.recorded
            .lock()
            .unwrap()
            .operations
            .iter()
            .filter(|(op, st)| *op == operation && *st == status)
            .count()
    }

    /// Operations that had a duration recorded.
    #[must_use]
    pub fn timed_operations(&self) -> Vec<Operation> {
        self.recorded
            .lock()
            .unwrap()
            .durations
            .iter()
            .map(|(op, _)| *op)
            .collect()
    }

    /// Swallowed secondary failures, in order.
    #[must_use]
    pub fn secondary_failures(&self) -> Vec<(Operation, SecondaryStep)> {
        self.recorded.lock().unwrap().secondary_failures.clone()
    }

    /// Ingestion outcomes, in order.
    #[must_use]
    pub fn ingestions(&self) -> Vec<(String, IngestionOutcome)> {
        self.recorded.lock().unwrap().ingestions.clone()
    }
}

impl Telemetry for RecordingTelemetry {
    fn record_operation(&self, operation: Operation, status: OperationStatus) {
        self.recorded
            .lock()
            .unwrap()
            .operations
            .push((operation, status));
    }

    fn record_duration(&self, operation: Operation, elapsed: Duration) {
        self.recorded
            .lock()
            .unwrap()
            .durations
            .push((operation, elapsed));
    }

    fn record_secondary_failure(&self, operation: Operation, step: SecondaryStep) {
        self.recorded
            .lock()
            .unwrap()
            .secondary_failures
            .push((operation, step));
    }

    fn record_ingestion(&self, topic: &str, outcome: IngestionOutcome) {
        self.recorded
            .lock()
            .unwrap()
            .ingestions
            .push((topic.to_string(), outcome));
    }
}
