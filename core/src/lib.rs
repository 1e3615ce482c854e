//! # Reporting Core
//!
//! Domain types and port traits for the report write path.
//!
//! The write path keeps three collaborators in step without a distributed
//! transaction:
//!
//! ```text
//! ┌──────────────┐    1    ┌─────────────────┐
//! │   Mutation   │ ──────► │  Primary store  │◄─── Source of truth
//! └──────┬───────┘         └─────────────────┘
//!        │                 ┌─────────────────┐
//!        ├──────── 2 ────► │   Cache store   │◄─── Advisory, best-effort
//!        │                 └─────────────────┘
//!        │                 ┌─────────────────┐
//!        └──────── 3 ────► │   Event bus     │◄─── Fire-and-forget
//!                          └─────────────────┘
//! ```
//!
//! This crate only defines the shapes. The orchestration lives in
//! `reporting-runtime`, concrete adapters live in `reporting-postgres`,
//! `reporting-redis` and `reporting-redpanda`, and in-memory fakes live in
//! `reporting-testing`.
//!
//! ## Modules
//!
//! - [`report`]: the `Report` entity, creation/patch payloads, filters
//! - [`custom_report`]: request/response types for custom report generation
//! - [`store`]: [`store::ReportStore`], the primary store port
//! - [`cache`]: [`cache::CacheStore`], the cache port
//! - [`event`] and [`event_bus`]: domain events and the publish/subscribe port
//! - [`sales`]: [`sales::SalesDataSource`], the synchronous peer port
//! - [`telemetry`]: [`telemetry::Telemetry`], the metrics/trace sink port
//! - [`environment`]: injected clock
//! - [`error`]: operation-level error taxonomy

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod cache;
pub mod custom_report;
pub mod environment;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod report;
pub mod sales;
pub mod store;
pub mod telemetry;

pub use cache::{CacheError, CacheFuture, CacheStore};
pub use custom_report::{CustomReport, CustomReportRequest, SalesData, custom_report_cache_key};
pub use environment::{Clock, SystemClock};
pub use error::{IngestionError, ReportError, SecondaryFailure};
pub use event::{Event, EventError, ReportAction, ReportEvent, SerializedEvent};
pub use event_bus::{Acknowledger, Delivery, Disposition, EventBus, EventBusError, EventStream};
pub use report::{
    AggregateQuery, Attributes, DateRange, NewReport, Report, ReportFilter, ReportId,
    ReportPatch, SortOrder, ValidationError,
};
pub use sales::{PeerError, SalesDataSource};
pub use store::{ReportStore, StoreError, StoreFuture};
pub use telemetry::{
    IngestionOutcome, NoopTelemetry, Operation, OperationStatus, SecondaryStep, Telemetry,
};
