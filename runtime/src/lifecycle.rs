//! The report lifecycle manager.
//!
//! [`ReportLifecycle`] owns the write ordering for every mutation:
//!
//! 1. primary store (authoritative; failure is returned to the caller)
//! 2. cache mirror (best-effort, bounded by `cache_timeout`)
//! 3. event publish (best-effort, bounded by `publish_timeout`)
//!
//! Steps 2 and 3 run only after step 1 committed. Their failures are logged,
//! counted through [`Telemetry::record_secondary_failure`], and swallowed.
//!
//! # Consistency window
//!
//! Between a primary write and the matching cache write, readers may see the
//! previous snapshot from the cache. If the cache write fails, the previous
//! snapshot stays visible until the next successful write or until the entry
//! expires. A failed eviction after delete is the one case where a cached
//! snapshot can outlive its row. The other one is an update racing a delete
//! of the same report: if the update's cache write lands after the delete's
//! eviction, the deleted report is cached again. In both cases `get` can
//! return a report whose row is gone until the entry expires, so only a cache
//! TTL bounds the window. Without one the stale entry stays until the key is
//! written or evicted again.
//!
//! # Example
//!
//! ```
//! use reporting_runtime::ReportLifecycle;
//! use reporting_core::report::NewReport;
//! use reporting_testing::{InMemoryCacheStore, InMemoryEventBus, InMemoryReportStore, StubSalesSource};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let lifecycle = ReportLifecycle::builder()
//!     .store(Arc::new(InMemoryReportStore::new()))
//!     .cache(Arc::new(InMemoryCacheStore::new()))
//!     .events(Arc::new(InMemoryEventBus::new()))
//!     .sales(Arc::new(StubSalesSource::default()))
//!     .build()
//!     .unwrap();
//!
//! let report = lifecycle.create(NewReport::new("sales")).await.unwrap();
//! assert_eq!(lifecycle.get(&report.id).await.unwrap(), Some(report));
//! # });
//! ```

use crate::scope::OperationScope;
use reporting_core::cache::CacheStore;
use reporting_core::custom_report::{
    CustomReport, CustomReportRequest, SalesData, custom_report_cache_key,
};
use reporting_core::environment::{Clock, SystemClock};
use reporting_core::error::{ReportError, SecondaryFailure};
use reporting_core::event::{ReportAction, ReportEvent, SerializedEvent};
use reporting_core::event_bus::EventBus;
use reporting_core::report::{
    AggregateQuery, NewReport, Report, ReportFilter, ReportId, ReportPatch, ValidationError,
};
use reporting_core::sales::SalesDataSource;
use reporting_core::store::ReportStore;
use reporting_core::telemetry::{NoopTelemetry, Operation, SecondaryStep, Telemetry};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::Instrument;

/// Outbound topic names, one per mutation kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportTopics {
    /// Topic for [`ReportAction::Created`]
    pub created: String,
    /// Topic for [`ReportAction::Updated`]
    pub updated: String,
    /// Topic for [`ReportAction::Deleted`]
    pub deleted: String,
}

impl ReportTopics {
    /// Topic a given action is announced on.
    #[must_use]
    pub fn for_action(&self, action: ReportAction) -> &str {
        match action {
            ReportAction::Created => &self.created,
            ReportAction::Updated => &self.updated,
            ReportAction::Deleted => &self.deleted,
        }
    }
}

impl Default for ReportTopics {
    fn default() -> Self {
        Self {
            created: "report-created".to_string(),
            updated: "report-updated".to_string(),
            deleted: "report-deleted".to_string(),
        }
    }
}

/// Tunables for [`ReportLifecycle`].
#[derive(Clone, Debug)]
pub struct LifecycleConfig {
    /// Upper bound on every cache call
    pub cache_timeout: Duration,
    /// Upper bound on every publish
    pub publish_timeout: Duration,
    /// Upper bound on the sales peer call
    pub sales_timeout: Duration,
    /// Write a primary-store hit back into the cache on `get`.
    ///
    /// Off by default: a repopulation racing a concurrent delete can put a
    /// snapshot of the deleted row back into the cache until it expires.
    pub repopulate_cache_on_miss: bool,
    /// Outbound topics
    pub topics: ReportTopics,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            cache_timeout: Duration::from_millis(500),
            publish_timeout: Duration::from_secs(2),
            sales_timeout: Duration::from_secs(5),
            repopulate_cache_on_miss: false,
            topics: ReportTopics::default(),
        }
    }
}

/// Errors from [`ReportLifecycleBuilder::build`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// A required port was never set
    #[error("Missing required port: {0}")]
    MissingPort(&'static str),
}

/// Builder for [`ReportLifecycle`].
///
/// The store, cache, event bus, and sales source are required. Telemetry
/// defaults to [`NoopTelemetry`] and the clock to [`SystemClock`].
#[derive(Default)]
pub struct ReportLifecycleBuilder {
    store: Option<Arc<dyn ReportStore>>,
    cache: Option<Arc<dyn CacheStore>>,
    events: Option<Arc<dyn EventBus>>,
    sales: Option<Arc<dyn SalesDataSource>>,
    telemetry: Option<Arc<dyn Telemetry>>,
    clock: Option<Arc<dyn Clock>>,
    config: LifecycleConfig,
}

impl ReportLifecycleBuilder {
    /// Set the primary store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn ReportStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the cache store.
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the event bus.
    #[must_use]
    pub fn events(mut self, events: Arc<dyn EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Set the sales peer.
    #[must_use]
    pub fn sales(mut self, sales: Arc<dyn SalesDataSource>) -> Self {
        self.sales = Some(sales);
        self
    }

    /// Set the telemetry sink.
    #[must_use]
    pub fn telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Set the clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the tunables.
    #[must_use]
    pub fn config(mut self, config: LifecycleConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the lifecycle manager.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::MissingPort`] if a required port was not set.
    pub fn build(self) -> Result<ReportLifecycle, BuildError> {
        Ok(ReportLifecycle {
            store: self.store.ok_or(BuildError::MissingPort("store"))?,
            cache: self.cache.ok_or(BuildError::MissingPort("cache"))?,
            events: self.events.ok_or(BuildError::MissingPort("events"))?,
            sales: self.sales.ok_or(BuildError::MissingPort("sales"))?,
            telemetry: self.telemetry.unwrap_or_else(|| Arc::new(NoopTelemetry)),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            config: Arc::new(self.config),
        })
    }
}

/// Orchestrates the primary store, cache, event bus, and telemetry for every
/// report operation.
///
/// Cheap to clone; all ports are shared.
#[derive(Clone)]
pub struct ReportLifecycle {
    store: Arc<dyn ReportStore>,
    cache: Arc<dyn CacheStore>,
    events: Arc<dyn EventBus>,
    sales: Arc<dyn SalesDataSource>,
    telemetry: Arc<dyn Telemetry>,
    clock: Arc<dyn Clock>,
    config: Arc<LifecycleConfig>,
}

impl ReportLifecycle {
    /// Start building a lifecycle manager.
    #[must_use]
    pub fn builder() -> ReportLifecycleBuilder {
        ReportLifecycleBuilder::default()
    }

    /// Current tunables.
    #[must_use]
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// The telemetry sink, shared with ingestion workers.
    #[must_use]
    pub fn telemetry(&self) -> &Arc<dyn Telemetry> {
        &self.telemetry
    }

    /// The event bus, shared with ingestion workers.
    #[must_use]
    pub fn events(&self) -> &Arc<dyn EventBus> {
        &self.events
    }

    /// Persist a new report, mirror it into the cache, and announce it.
    ///
    /// # Errors
    ///
    /// - [`ReportError::Validation`] if the payload is invalid. No port is called.
    /// - [`ReportError::Persistence`] if the insert fails. Nothing is cached or
    ///   published.
    pub async fn create(&self, payload: NewReport) -> Result<Report, ReportError> {
        let mut scope = self.scope(Operation::Create);
        let span = scope.span().clone();
        self.create_in(&mut scope, payload).instrument(span).await
    }

    /// Every report matching `filter`. Reads the primary store only.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Persistence`] if the query fails.
    pub async fn list(&self, filter: &ReportFilter) -> Result<Vec<Report>, ReportError> {
        let mut scope = self.scope(Operation::List);
        let span = scope.span().clone();
        self.list_in(&mut scope, filter).instrument(span).await
    }

    /// Fetch a report, preferring the cache.
    ///
    /// A cache hit is returned without touching the primary store. A miss, a
    /// cache failure, or an entry that does not decode to this id falls back
    /// to the primary store. `Ok(None)` means the report does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Persistence`] if the fallback read fails.
    pub async fn get(&self, id: &ReportId) -> Result<Option<Report>, ReportError> {
        let mut scope = self.scope(Operation::Get);
        scope.record_report_id(id);
        let span = scope.span().clone();
        self.get_in(&mut scope, id).instrument(span).await
    }

    /// Apply `patch` to an existing report, refresh the cache, and announce it.
    ///
    /// Returns `Ok(None)` when the id is unknown; nothing is cached or
    /// published then.
    ///
    /// # Errors
    ///
    /// - [`ReportError::Validation`] if the patch would break an invariant.
    /// - [`ReportError::Persistence`] if the update fails.
    pub async fn update(
        &self,
        id: &ReportId,
        patch: ReportPatch,
    ) -> Result<Option<Report>, ReportError> {
        let mut scope = self.scope(Operation::Update);
        scope.record_report_id(id);
        let span = scope.span().clone();
        self.update_in(&mut scope, id, patch).instrument(span).await
    }

    /// Delete a report, evict its cache entry, and announce it.
    ///
    /// Returns the deleted report, or `Ok(None)` when the id is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Persistence`] if the delete fails.
    pub async fn delete(&self, id: &ReportId) -> Result<Option<Report>, ReportError> {
        let mut scope = self.scope(Operation::Delete);
        scope.record_report_id(id);
        let span = scope.span().clone();
        self.delete_in(&mut scope, id).instrument(span).await
    }

    /// Aggregate every report of one type, newest first, and attach sales
    /// figures from the peer.
    ///
    /// A failed or slow peer does not fail generation: the result carries
    /// [`SalesData::Unavailable`] instead. The result is memoized in the
    /// cache on a best-effort basis.
    ///
    /// # Errors
    ///
    /// - [`ReportError::Validation`] if `report_type` is blank.
    /// - [`ReportError::Persistence`] if the aggregation fails.
    pub async fn generate_custom_report(
        &self,
        request: CustomReportRequest,
    ) -> Result<CustomReport, ReportError> {
        let mut scope = self.scope(Operation::Generate);
        let span = scope.span().clone();
        self.generate_in(&mut scope, request).instrument(span).await
    }

    async fn create_in(
        &self,
        scope: &mut OperationScope,
        payload: NewReport,
    ) -> Result<Report, ReportError> {
        payload.validate()?;
        let report = self
            .store
            .insert(payload, self.clock.now())
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Report insert failed"))?;
        scope.record_report_id(&report.id);

        self.write_through(Operation::Create, &report).await;
        self.announce(Operation::Create, ReportAction::Created, &report.id)
            .await;

        tracing::info!(report_type = %report.report_type, "Report created");
        scope.succeed();
        Ok(report)
    }

    async fn list_in(
        &self,
        scope: &mut OperationScope,
        filter: &ReportFilter,
    ) -> Result<Vec<Report>, ReportError> {
        let reports = self
            .store
            .find(filter)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Report query failed"))?;
        tracing::debug!(count = reports.len(), "Reports listed");
        scope.succeed();
        Ok(reports)
    }

    async fn get_in(
        &self,
        scope: &mut OperationScope,
        id: &ReportId,
    ) -> Result<Option<Report>, ReportError> {
        if let Some(report) = self.cached(id).await {
            tracing::debug!("Cache hit");
            scope.succeed();
            return Ok(Some(report));
        }

        let found = self
            .store
            .find_by_id(id)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Report lookup failed"))?;
        if self.config.repopulate_cache_on_miss {
            if let Some(report) = &found {
                self.write_through(Operation::Get, report).await;
            }
        }
        scope.found(found.as_ref());
        Ok(found)
    }

    async fn update_in(
        &self,
        scope: &mut OperationScope,
        id: &ReportId,
        patch: ReportPatch,
    ) -> Result<Option<Report>, ReportError> {
        patch.validate()?;
        let updated = self
            .store
            .update_by_id(id, patch, self.clock.now())
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Report update failed"))?;

        let Some(report) = updated else {
            scope.not_found();
            return Ok(None);
        };

        self.write_through(Operation::Update, &report).await;
        self.announce(Operation::Update, ReportAction::Updated, &report.id)
            .await;

        tracing::info!("Report updated");
        scope.succeed();
        Ok(Some(report))
    }

    async fn delete_in(
        &self,
        scope: &mut OperationScope,
        id: &ReportId,
    ) -> Result<Option<Report>, ReportError> {
        let deleted = self
            .store
            .delete_by_id(id)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Report delete failed"))?;

        let Some(report) = deleted else {
            scope.not_found();
            return Ok(None);
        };

        let key = id.cache_key();
        let _ = self
            .best_effort(
                Operation::Delete,
                SecondaryStep::CacheEvict,
                self.config.cache_timeout,
                self.cache.delete(&key),
            )
            .await;
        self.announce(Operation::Delete, ReportAction::Deleted, id)
            .await;

        tracing::info!("Report deleted");
        scope.succeed();
        Ok(Some(report))
    }

    async fn generate_in(
        &self,
        scope: &mut OperationScope,
        request: CustomReportRequest,
    ) -> Result<CustomReport, ReportError> {
        if request.report_type.trim().is_empty() {
            return Err(ValidationError::EmptyReportType.into());
        }

        let query = AggregateQuery::new(request.report_type.clone(), request.filter.clone());
        let reports = self
            .store
            .aggregate(&query)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Report aggregation failed"))?;

        let sales = match self
            .best_effort(
                Operation::Generate,
                SecondaryStep::SalesLookup,
                self.config.sales_timeout,
                self.sales
                    .fetch_sales(request.date_range.as_ref(), &request.filter),
            )
            .await
        {
            Ok(data) => SalesData::Available { data },
            Err(failure) => SalesData::Unavailable {
                reason: failure.reason,
            },
        };

        let custom = CustomReport {
            report_type: request.report_type,
            date_range: request.date_range,
            generated_at: self.clock.now(),
            reports,
            sales,
        };

        self.memoize(&custom).await;

        tracing::info!(
            report_type = %custom.report_type,
            matched = custom.reports.len(),
            sales_available = custom.sales.is_available(),
            "Custom report generated"
        );
        scope.succeed();
        Ok(custom)
    }

    fn scope(&self, operation: Operation) -> OperationScope {
        OperationScope::open(Arc::clone(&self.telemetry), operation)
    }

    /// Probe the cache for a decodable snapshot of `id`.
    async fn cached(&self, id: &ReportId) -> Option<Report> {
        let key = id.cache_key();
        let bytes = self
            .best_effort(
                Operation::Get,
                SecondaryStep::CacheRead,
                self.config.cache_timeout,
                self.cache.get(&key),
            )
            .await
            .ok()??;

        match serde_json::from_slice::<Report>(&bytes) {
            Ok(report) if report.id == *id => Some(report),
            Ok(report) => {
                self.secondary_failed(
                    Operation::Get,
                    &SecondaryFailure::new(
                        SecondaryStep::CacheRead,
                        format!("entry {key} holds report {}", report.id),
                    ),
                );
                None
            }
            Err(e) => {
                self.secondary_failed(
                    Operation::Get,
                    &SecondaryFailure::new(
                        SecondaryStep::CacheRead,
                        format!("undecodable entry {key}: {e}"),
                    ),
                );
                None
            }
        }
    }

    /// Mirror a committed snapshot into the cache.
    async fn write_through(&self, operation: Operation, report: &Report) {
        let bytes = match serde_json::to_vec(report) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.secondary_failed(
                    operation,
                    &SecondaryFailure::new(SecondaryStep::CacheWrite, e.to_string()),
                );
                return;
            }
        };
        let key = report.id.cache_key();
        let _ = self
            .best_effort(
                operation,
                SecondaryStep::CacheWrite,
                self.config.cache_timeout,
                self.cache.set(&key, &bytes),
            )
            .await;
    }

    /// Publish a committed mutation.
    async fn announce(&self, operation: Operation, action: ReportAction, id: &ReportId) {
        let event = ReportEvent::new(action, id.clone(), self.clock.now());
        let serialized = match SerializedEvent::from_event(&event, None) {
            Ok(serialized) => serialized,
            Err(e) => {
                self.secondary_failed(
                    operation,
                    &SecondaryFailure::new(SecondaryStep::Publish, e.to_string()),
                );
                return;
            }
        };
        let topic = self.config.topics.for_action(action);
        let _ = self
            .best_effort(
                operation,
                SecondaryStep::Publish,
                self.config.publish_timeout,
                self.events.publish(topic, &serialized),
            )
            .await;
    }

    async fn memoize(&self, custom: &CustomReport) {
        let key = custom_report_cache_key(&custom.report_type, custom.generated_at);
        match serde_json::to_vec(custom) {
            Ok(bytes) => {
                let _ = self
                    .best_effort(
                        Operation::Generate,
                        SecondaryStep::Memoize,
                        self.config.cache_timeout,
                        self.cache.set(&key, &bytes),
                    )
                    .await;
            }
            Err(e) => self.secondary_failed(
                Operation::Generate,
                &SecondaryFailure::new(SecondaryStep::Memoize, e.to_string()),
            ),
        }
    }

    /// Run a secondary step under a deadline. Failures are recorded here, so
    /// callers may ignore the `Err`.
    async fn best_effort<T, E, F>(
        &self,
        operation: Operation,
        step: SecondaryStep,
        limit: Duration,
        step_future: F,
    ) -> Result<T, SecondaryFailure>
    where
        E: Display,
        F: Future<Output = Result<T, E>>,
    {
        let failure = match tokio::time::timeout(limit, step_future).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => SecondaryFailure::new(step, e.to_string()),
            Err(_) => SecondaryFailure::new(
                step,
                format!("timed out after {}ms", limit.as_millis()),
            ),
        };
        self.secondary_failed(operation, &failure);
        Err(failure)
    }

    fn secondary_failed(&self, operation: Operation, failure: &SecondaryFailure) {
        tracing::warn!(
            operation = operation.as_str(),
            step = failure.step.as_str(),
            reason = %failure.reason,
            "Secondary step failed"
        );
        self.telemetry.record_secondary_failure(operation, failure.step);
    }
}
