//! In-memory primary store.

use crate::call_log::{CallLog, Port, record};
use chrono::{DateTime, Utc};
use reporting_core::report::{
    AggregateQuery, NewReport, Report, ReportFilter, ReportId, ReportPatch,
};
use reporting_core::store::{ReportStore, StoreError, StoreFuture};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// `Vec`-backed [`ReportStore`] that keeps insertion order.
///
/// Ids are assigned sequentially as `R1`, `R2`, ... so tests can predict them.
///
/// # Example
///
/// ```
/// use reporting_core::report::NewReport;
/// use reporting_core::store::ReportStore;
/// use reporting_testing::{InMemoryReportStore, test_clock};
/// use reporting_core::environment::Clock;
///
/// # tokio_test::block_on(async {
/// let store = InMemoryReportStore::new();
/// let report = store.insert(NewReport::new("sales"), test_clock().now()).await.unwrap();
/// assert_eq!(report.id.as_str(), "R1");
/// assert_eq!(store.len(), 1);
/// # });
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryReportStore {
    rows: Arc<RwLock<Vec<Report>>>,
    next_id: Arc<AtomicU64>,
    failing: Arc<AtomicBool>,
    log: Option<CallLog>,
}

impl InMemoryReportStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every call in `log`.
    #[must_use]
    pub fn with_call_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Put a report in place without going through `insert`.
    pub fn seed(&self, report: Report) {
        self.rows.write().unwrap().push(report);
    }

    /// Number of stored reports
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().unwrap().len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().unwrap().is_empty()
    }

    /// Snapshot of a stored report.
    #[must_use]
    pub fn get(&self, id: &ReportId) -> Option<Report> {
        self.rows
            .read()
            .unwrap()
            .iter()
            .find(|r| r.id == *id)
            .cloned()
    }

    /// All stored reports, in insertion order.
    #[must_use]
    pub fn all(&self) -> Vec<Report> {
        self.rows.read().unwrap().clone()
    }

    fn check(&self, method: &'static str, target: &str) -> Result<(), StoreError> {
        record(self.log.as_ref(), Port::Store, method, target);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::ConnectionFailed(format!(
                "in-memory store is failing ({method})"
            )));
        }
        Ok(())
    }
}

impl ReportStore for InMemoryReportStore {
    fn insert(&self, report: NewReport, now: DateTime<Utc>) -> StoreFuture<'_, Report> {
        Box::pin(async move {
            self.check("insert", &report.report_type)?;
            let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let report = report.into_report(ReportId::new(format!("R{n}")), now);
            self.rows.write().unwrap().push(report.clone());
            Ok(report)
        })
    }

    fn find_by_id(&self, id: &ReportId) -> StoreFuture<'_, Option<Report>> {
        let id = id.clone();
        Box::pin(async move {
            self.check("find_by_id", id.as_str())?;
            Ok(self.get(&id))
        })
    }

    fn find(&self, filter: &ReportFilter) -> StoreFuture<'_, Vec<Report>> {
        let filter = filter.clone();
        Box::pin(async move {
            self.check("find", "")?;
            Ok(self
                .rows
                .read()
                .unwrap()
                .iter()
                .filter(|r| filter.matches(r))
                .cloned()
                .collect())
        })
    }

    fn update_by_id(
        &self,
        id: &ReportId,
        patch: ReportPatch,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Report>> {
        let id = id.clone();
        Box::pin(async move {
            self.check("update_by_id", id.as_str())?;
            let mut rows = self.rows.write().unwrap();
            Ok(rows.iter_mut().find(|r| r.id == id).map(|report| {
                patch.apply_to(report, now);
                report.clone()
            }))
        })
    }

    fn delete_by_id(&self, id: &ReportId) -> StoreFuture<'_, Option<Report>> {
        let id = id.clone();
        Box::pin(async move {
            self.check("delete_by_id", id.as_str())?;
            let mut rows = self.rows.write().unwrap();
            Ok(rows
                .iter()
                .position(|r| r.id == id)
                .map(|index| rows.remove(index)))
        })
    }

    fn aggregate(&self, query: &AggregateQuery) -> StoreFuture<'_, Vec<Report>> {
        let query = query.clone();
        Box::pin(async move {
            self.check("aggregate", &query.report_type)?;
            let mut matched: Vec<Report> = self
                .rows
                .read()
                .unwrap()
                .iter()
                .filter(|r| query.matches(r))
                .cloned()
                .collect();
            query.sort(&mut matched);
            Ok(matched)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_clock;
    use reporting_core::environment::Clock;
    use serde_json::json;

    #[tokio::test]
    async fn update_never_inserts() {
        let store = InMemoryReportStore::new();
        let result = store
            .update_by_id(&ReportId::new("missing"), ReportPatch::default(), test_clock().now())
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn delete_returns_removed_row() {
        let store = InMemoryReportStore::new();
        let created = store
            .insert(NewReport::new("sales").with_attribute("region", json!("North")), test_clock().now())
            .await
            .unwrap();
        let removed = store.delete_by_id(&created.id).await.unwrap();
        assert_eq!(removed, Some(created));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn failing_store_rejects_calls() {
        let store = InMemoryReportStore::new();
        store.set_failing(true);
        assert!(store.insert(NewReport::new("sales"), test_clock().now()).await.is_err());
        assert!(store.is_empty());
    }
}
