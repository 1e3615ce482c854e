//! Metrics/trace sink port.
//!
//! Telemetry is observational. Every method is infallible by signature, and
//! the lifecycle manager never branches on anything recorded here.

use std::fmt;
use std::time::Duration;

/// Lifecycle operations that open a scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `ReportLifecycle::create`
    Create,
    /// `ReportLifecycle::list`
    List,
    /// `ReportLifecycle::get`
    Get,
    /// `ReportLifecycle::update`
    Update,
    /// `ReportLifecycle::delete`
    Delete,
    /// `ReportLifecycle::generate_custom_report`
    Generate,
}

impl Operation {
    /// Metric label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::List => "list",
            Self::Get => "get",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Generate => "generate",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome recorded when a scope closes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationStatus {
    /// The operation returned a value
    Success,
    /// The target id did not exist
    NotFound,
    /// The operation failed, or never reached a terminal state
    Error,
}

impl OperationStatus {
    /// Metric label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NotFound => "not_found",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Best-effort steps whose failure is swallowed after the primary step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SecondaryStep {
    /// Mirror a snapshot into the cache
    CacheWrite,
    /// Probe the cache before the primary store
    CacheRead,
    /// Evict a deleted snapshot
    CacheEvict,
    /// Announce the mutation on the bus
    Publish,
    /// Ask the sales peer for figures
    SalesLookup,
    /// Store a generated custom report
    Memoize,
}

impl SecondaryStep {
    /// Metric label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CacheWrite => "cache_write",
            Self::CacheRead => "cache_read",
            Self::CacheEvict => "cache_evict",
            Self::Publish => "publish",
            Self::SalesLookup => "sales",
            Self::Memoize => "memoize",
        }
    }
}

impl fmt::Display for SecondaryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What became of one inbound event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IngestionOutcome {
    /// A report was created from it
    Created,
    /// It was forwarded to the dead-letter topic
    Parked,
    /// It failed and could not be parked either, so it was handed back
    /// to the transport for redelivery
    Requeued,
    /// The stream yielded an error instead of an event
    StreamError,
}

impl IngestionOutcome {
    /// Metric label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Parked => "parked",
            Self::Requeued => "requeued",
            Self::StreamError => "stream_error",
        }
    }
}

/// Sink for per-operation metrics and spans.
pub trait Telemetry: Send + Sync {
    /// Count one finished operation.
    fn record_operation(&self, operation: Operation, status: OperationStatus);

    /// Record how long an operation took.
    fn record_duration(&self, operation: Operation, elapsed: Duration);

    /// Count one swallowed secondary failure.
    fn record_secondary_failure(&self, operation: Operation, step: SecondaryStep);

    /// Count one inbound event.
    fn record_ingestion(&self, _topic: &str, _outcome: IngestionOutcome) {}

    /// Open the span an operation runs in.
    ///
    /// `report_id` and `outcome` are declared empty so the scope can fill
    /// them in later.
    fn start_span(&self, operation: Operation) -> tracing::Span {
        tracing::info_span!(
            "report_operation",
            operation = operation.as_str(),
            report_id = tracing::field::Empty,
            outcome = tracing::field::Empty,
        )
    }
}

/// Telemetry that records nothing. Spans are still created.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn record_operation(&self, _operation: Operation, _status: OperationStatus) {}

    fn record_duration(&self, _operation: Operation, _elapsed: Duration) {}

    fn record_secondary_failure(&self, _operation: Operation, _step: SecondaryStep) {}
}
