//! Primary store port.
//!
//! The primary store is the source of truth. It assigns ids and timestamps
//! arrive from the caller's [`Clock`](crate::environment::Clock), so adapters
//! never read wall time themselves.
//!
//! Every method is atomic per entity. In particular [`ReportStore::update_by_id`]
//! is a single read-modify-write and never inserts, and
//! [`ReportStore::delete_by_id`] returns the row it removed.

use crate::report::{AggregateQuery, NewReport, Report, ReportFilter, ReportId, ReportPatch};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from a primary store backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Could not obtain a connection
    #[error("Store connection failed: {0}")]
    ConnectionFailed(String),

    /// A query failed to execute
    #[error("Store query failed: {0}")]
    QueryFailed(String),

    /// The store refused the write (constraint violation, read-only replica, ...)
    #[error("Store rejected write: {0}")]
    WriteRejected(String),

    /// A row could not be mapped to or from a [`Report`]
    #[error("Store serialization failed: {0}")]
    Serialization(String),
}

/// Boxed future returned by [`ReportStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Durable, authoritative report storage.
pub trait ReportStore: Send + Sync {
    /// Insert a new report, assigning its id. Both timestamps are set to `now`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails. Nothing is persisted then.
    fn insert(&self, report: NewReport, now: DateTime<Utc>) -> StoreFuture<'_, Report>;

    /// Fetch a report by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails. Absence is `Ok(None)`.
    fn find_by_id(&self, id: &ReportId) -> StoreFuture<'_, Option<Report>>;

    /// Fetch every report matching `filter`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails.
    fn find(&self, filter: &ReportFilter) -> StoreFuture<'_, Vec<Report>>;

    /// Atomically apply `patch` to the report with `id` and return the result.
    ///
    /// Returns `Ok(None)` without writing anything when the id is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read-modify-write fails.
    fn update_by_id(
        &self,
        id: &ReportId,
        patch: ReportPatch,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Report>>;

    /// Atomically remove the report with `id`, returning what was removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the delete fails.
    fn delete_by_id(&self, id: &ReportId) -> StoreFuture<'_, Option<Report>>;

    /// Run a match-and-sort query.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    fn aggregate(&self, query: &AggregateQuery) -> StoreFuture<'_, Vec<Report>>;
}
