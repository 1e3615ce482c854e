//! # Reporting Runtime
//!
//! Orchestration for the report write path.
//!
//! ## Core Components
//!
//! - [`ReportLifecycle`]: create/list/get/update/delete/generate over the
//!   store, cache, event bus, and telemetry ports
//! - [`scope::OperationScope`]: RAII timer and span for each operation
//! - [`ingestion`]: turns inbound domain events into reports
//! - [`metrics`]: Prometheus recorder and the production [`Telemetry`] sink
//!
//! [`Telemetry`]: reporting_core::telemetry::Telemetry

/// Report lifecycle manager
pub mod lifecycle;

/// RAII operation scopes
pub mod scope;

/// Inbound event ingestion
pub mod ingestion;

/// Prometheus metrics for observability
pub mod metrics;

pub use ingestion::{IngestionHandler, IngestionStats, IngestionWorker, sentinel_report_type};
pub use lifecycle::{BuildError, LifecycleConfig, ReportLifecycle, ReportLifecycleBuilder, ReportTopics};
pub use metrics::{MetricsError, MetricsServer, PrometheusTelemetry};
pub use scope::OperationScope;
