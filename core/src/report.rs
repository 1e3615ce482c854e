//! The `Report` entity and the payloads that create, patch, and query it.
//!
//! A report has a fixed, statically checked field set plus one open
//! [`Attributes`] bag for schema-less data (filters, ingested event bodies).
//!
//! # Wire format
//!
//! All types serialize as camelCase JSON. `attributes` also accepts the legacy
//! `filters` key, and a date range accepts `startDate`/`endDate` as aliases for
//! `start`/`end`. Date bounds may be RFC 3339 timestamps or plain `YYYY-MM-DD`
//! dates (interpreted as midnight UTC).
//!
//! ```
//! use reporting_core::report::NewReport;
//!
//! let payload: NewReport = serde_json::from_str(r#"{
//!     "reportType": "sales",
//!     "dateRange": { "start": "2024-01-01", "end": "2024-03-31" },
//!     "attributes": { "region": "North" }
//! }"#).unwrap();
//!
//! assert_eq!(payload.report_type, "sales");
//! assert!(payload.validate().is_ok());
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Open, string-keyed extension bag carried by every report.
pub type Attributes = Map<String, Value>;

/// Violations of the entity invariants.
///
/// These are detected before any port is called.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `reportType` is required and must contain a non-whitespace character.
    #[error("reportType must not be empty")]
    EmptyReportType,

    /// A date range must satisfy `start <= end`.
    #[error("dateRange start {start} is after end {end}")]
    InvertedDateRange {
        /// Lower bound that was supplied
        start: DateTime<Utc>,
        /// Upper bound that was supplied
        end: DateTime<Utc>,
    },
}

/// Opaque report identifier assigned by the primary store.
///
/// Never changes after creation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(String);

impl ReportId {
    /// Wrap a store-assigned identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Cache key under which the snapshot of this report is mirrored.
    ///
    /// ```
    /// use reporting_core::report::ReportId;
    ///
    /// assert_eq!(ReportId::new("R1").cache_key(), "report-R1");
    /// ```
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!("report-{}", self.0)
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ReportId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ReportId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Inclusive time window with `start <= end`.
///
/// The invariant is enforced on construction and on deserialization, so a
/// `DateRange` value in hand is always well-formed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DateRange {
    /// Build a date range.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvertedDateRange`] if `start > end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvertedDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Lower bound.
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Upper bound.
    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }
}

#[derive(Deserialize)]
struct RawDateRange {
    #[serde(alias = "startDate", deserialize_with = "flexible_timestamp")]
    start: DateTime<Utc>,
    #[serde(alias = "endDate", deserialize_with = "flexible_timestamp")]
    end: DateTime<Utc>,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = ValidationError;

    fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
        Self::new(raw.start, raw.end)
    }
}

/// Accept either an RFC 3339 timestamp or a bare `YYYY-MM-DD` date.
fn flexible_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("invalid timestamp '{raw}': expected RFC 3339 or YYYY-MM-DD"))
}

/// The managed entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Store-assigned identifier
    pub id: ReportId,
    /// Classification tag, never empty
    pub report_type: String,
    /// Optional display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_name: Option<String>,
    /// Schema-less extension data
    #[serde(default)]
    pub attributes: Attributes,
    /// Optional time window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    /// Free-form lifecycle tag ("new", "processed", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Set once on insert
    pub created_at: DateTime<Utc>,
    /// Refreshed on every successful primary write
    pub updated_at: DateTime<Utc>,
}

impl Report {
    /// Compare everything except the store-managed timestamps.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.id == other.id
            && self.report_type == other.report_type
            && self.report_name == other.report_name
            && self.attributes == other.attributes
            && self.date_range == other.date_range
            && self.status == other.status
    }
}

/// Creation payload: a report without its store-assigned fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReport {
    /// Classification tag, required
    pub report_type: String,
    /// Optional display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_name: Option<String>,
    /// Schema-less extension data
    #[serde(default, alias = "filters")]
    pub attributes: Attributes,
    /// Optional time window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    /// Free-form lifecycle tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl NewReport {
    /// Start a payload with the given report type and nothing else.
    #[must_use]
    pub fn new(report_type: impl Into<String>) -> Self {
        Self {
            report_type: report_type.into(),
            report_name: None,
            attributes: Attributes::new(),
            date_range: None,
            status: None,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.report_name = Some(name.into());
        self
    }

    /// Replace the attribute bag.
    #[must_use]
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Insert a single attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Set the date range.
    #[must_use]
    pub const fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    /// Set the status tag.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Check the entity invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyReportType`] for a blank `reportType`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.report_type.trim().is_empty() {
            return Err(ValidationError::EmptyReportType);
        }
        Ok(())
    }

    /// Materialize the entity once the store has assigned an id.
    ///
    /// Both timestamps are set to `now`.
    #[must_use]
    pub fn into_report(self, id: ReportId, now: DateTime<Utc>) -> Report {
        Report {
            id,
            report_type: self.report_type,
            report_name: self.report_name,
            attributes: self.attributes,
            date_range: self.date_range,
            status: self.status,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Update payload. Absent fields are left untouched.
///
/// `attributes` is merged shallowly into the stored bag: each key overwrites
/// the stored key and a JSON `null` removes it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPatch {
    /// Replacement classification tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_type: Option<String>,
    /// Replacement display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_name: Option<String>,
    /// Attribute keys to merge
    #[serde(default, alias = "filters", skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Attributes>,
    /// Replacement date range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    /// Replacement status tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ReportPatch {
    /// Patch that only merges the given attributes.
    #[must_use]
    pub fn attributes(attributes: Attributes) -> Self {
        Self {
            attributes: Some(attributes),
            ..Self::default()
        }
    }

    /// Set the replacement status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Check that applying the patch cannot break an invariant.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyReportType`] when the patch blanks the
    /// report type.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.report_type {
            Some(report_type) if report_type.trim().is_empty() => {
                Err(ValidationError::EmptyReportType)
            }
            _ => Ok(()),
        }
    }

    /// Apply the patch in place and stamp `updated_at`.
    ///
    /// `id` and `created_at` are never touched.
    pub fn apply_to(self, report: &mut Report, now: DateTime<Utc>) {
        if let Some(report_type) = self.report_type {
            report.report_type = report_type;
        }
        if let Some(name) = self.report_name {
            report.report_name = Some(name);
        }
        if let Some(attributes) = self.attributes {
            for (key, value) in attributes {
                if value.is_null() {
                    report.attributes.remove(&key);
                } else {
                    report.attributes.insert(key, value);
                }
            }
        }
        if let Some(range) = self.date_range {
            report.date_range = Some(range);
        }
        if let Some(status) = self.status {
            report.status = Some(status);
        }
        report.updated_at = now;
    }
}

/// Conjunction of equality predicates. The empty filter matches every report.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFilter {
    /// Required report type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_type: Option<String>,
    /// Required status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Attribute keys that must be present with exactly these values
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Attributes,
}

impl ReportFilter {
    /// Filter that matches everything.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Build a filter from flat key/value pairs such as an HTTP query string.
    ///
    /// `reportType` and `status` map to the dedicated fields. Every other key
    /// becomes a string-valued attribute predicate.
    ///
    /// ```
    /// use reporting_core::report::ReportFilter;
    ///
    /// let filter = ReportFilter::from_pairs([("reportType", "sales"), ("region", "North")]);
    /// assert_eq!(filter.report_type.as_deref(), Some("sales"));
    /// assert_eq!(filter.attributes["region"], "North");
    /// ```
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut filter = Self::default();
        for (key, value) in pairs {
            let key = key.into();
            let value = value.into();
            match key.as_str() {
                "reportType" => filter.report_type = Some(value),
                "status" => filter.status = Some(value),
                _ => {
                    filter.attributes.insert(key, Value::String(value));
                }
            }
        }
        filter
    }

    /// Require a report type.
    #[must_use]
    pub fn with_report_type(mut self, report_type: impl Into<String>) -> Self {
        self.report_type = Some(report_type.into());
        self
    }

    /// Require a status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Require an attribute value.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// `true` when the filter has no predicates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.report_type.is_none() && self.status.is_none() && self.attributes.is_empty()
    }

    /// Evaluate the filter against a report.
    #[must_use]
    pub fn matches(&self, report: &Report) -> bool {
        let type_ok = self
            .report_type
            .as_ref()
            .is_none_or(|expected| report.report_type == *expected);
        let status_ok = self
            .status
            .as_deref()
            .is_none_or(|expected| report.status.as_deref() == Some(expected));
        let attributes_ok = self
            .attributes
            .iter()
            .all(|(key, expected)| report.attributes.get(key) == Some(expected));
        type_ok && status_ok && attributes_ok
    }
}

/// Ordering applied by [`AggregateQuery`].
///
/// Ties on `createdAt` always keep insertion order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    /// Newest first
    #[default]
    CreatedAtDesc,
    /// Oldest first
    CreatedAtAsc,
}

/// Match-and-sort query used by custom report generation.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateQuery {
    /// Report type every result must have
    pub report_type: String,
    /// Additional predicates (its own `report_type` is ignored)
    pub filter: ReportFilter,
    /// Result ordering
    pub sort: SortOrder,
}

impl AggregateQuery {
    /// Match `report_type` and `filter`, newest first.
    #[must_use]
    pub fn new(report_type: impl Into<String>, mut filter: ReportFilter) -> Self {
        filter.report_type = None;
        Self {
            report_type: report_type.into(),
            filter,
            sort: SortOrder::CreatedAtDesc,
        }
    }

    /// Override the ordering.
    #[must_use]
    pub const fn sorted(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    /// Evaluate the match stage against a report.
    #[must_use]
    pub fn matches(&self, report: &Report) -> bool {
        report.report_type == self.report_type && self.filter.matches(report)
    }

    /// Sort reports that are already in insertion order.
    ///
    /// The sort is stable, so equal timestamps keep their insertion order.
    pub fn sort(&self, reports: &mut [Report]) {
        match self.sort {
            SortOrder::CreatedAtDesc => reports.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            SortOrder::CreatedAtAsc => reports.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::json;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn sample(id: &str, day: u32) -> Report {
        NewReport::new("sales")
            .with_attribute("region", "North")
            .into_report(ReportId::new(id), ts(day))
    }

    #[test]
    fn date_range_rejects_inverted_bounds() {
        let err = DateRange::new(ts(2), ts(1)).unwrap_err();
        assert!(matches!(err, ValidationError::InvertedDateRange { .. }));
        assert!(DateRange::new(ts(1), ts(1)).is_ok());
    }

    #[test]
    fn date_range_deserializes_plain_dates_and_legacy_names() {
        let range: DateRange =
            serde_json::from_value(json!({ "startDate": "2024-01-01", "endDate": "2024-03-31" }))
                .unwrap();
        assert_eq!(range.start(), ts(1));
        assert_eq!(range.end(), Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap());

        let inverted = serde_json::from_value::<DateRange>(
            json!({ "start": "2024-03-31", "end": "2024-01-01" }),
        );
        assert!(inverted.is_err());
    }

    #[test]
    fn new_report_accepts_legacy_filters_key() {
        let payload: NewReport = serde_json::from_value(json!({
            "reportType": "sales",
            "reportName": "Sales Q1 2024",
            "filters": { "region": "North", "product": "Widget A" }
        }))
        .unwrap();
        assert_eq!(payload.attributes["product"], "Widget A");
        assert_eq!(payload.report_name.as_deref(), Some("Sales Q1 2024"));
    }

    #[test]
    fn blank_report_type_is_invalid() {
        assert_eq!(
            NewReport::new("  ").validate(),
            Err(ValidationError::EmptyReportType)
        );
        let patch = ReportPatch {
            report_type: Some(String::new()),
            ..ReportPatch::default()
        };
        assert_eq!(patch.validate(), Err(ValidationError::EmptyReportType));
    }

    #[test]
    fn patch_merges_attributes_and_keeps_identity() {
        let mut report = sample("R1", 1);
        report.attributes.insert("obsolete".into(), json!(true));

        let mut attrs = Attributes::new();
        attrs.insert("status".into(), json!("completed"));
        attrs.insert("obsolete".into(), Value::Null);
        ReportPatch::attributes(attrs).apply_to(&mut report, ts(5));

        assert_eq!(report.id, ReportId::new("R1"));
        assert_eq!(report.created_at, ts(1));
        assert_eq!(report.updated_at, ts(5));
        assert_eq!(report.attributes["region"], "North");
        assert_eq!(report.attributes["status"], "completed");
        assert!(!report.attributes.contains_key("obsolete"));
    }

    #[test]
    fn report_json_uses_camel_case() {
        let value = serde_json::to_value(sample("R1", 1)).unwrap();
        assert_eq!(value["reportType"], "sales");
        assert!(value.get("createdAt").is_some());
        assert!(value.get("dateRange").is_none());
    }

    #[test]
    fn aggregate_sort_is_stable_on_ties() {
        let mut reports = vec![sample("a", 1), sample("b", 3), sample("c", 1), sample("d", 3)];
        AggregateQuery::new("sales", ReportFilter::all()).sort(&mut reports);
        let ids: Vec<_> = reports.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["b", "d", "a", "c"]);
    }

    #[test]
    fn filter_requires_every_criterion() {
        let report = sample("R1", 1);
        let north = ReportFilter::all()
            .with_report_type("sales")
            .with_attribute("region", "North");
        assert!(north.matches(&report));
        assert!(!north.clone().with_attribute("region", "South").matches(&report));
        assert!(!north.clone().with_attribute("product", "Widget A").matches(&report));
        assert!(!north.clone().with_status("completed").matches(&report));
        assert!(!north.with_report_type("inventory").matches(&report));
    }

    #[test]
    fn aggregate_query_ignores_filter_report_type() {
        let query = AggregateQuery::new("sales", ReportFilter::all().with_report_type("other"));
        assert!(query.matches(&sample("R1", 1)));
    }

    proptest! {
        #[test]
        fn empty_filter_matches_any_report(report_type in "[a-z]{1,8}", key in "[a-z]{1,6}", value in any::<i64>()) {
            let report = NewReport::new(report_type)
                .with_attribute(key, value)
                .into_report(ReportId::new("x"), ts(1));
            prop_assert!(ReportFilter::all().matches(&report));
        }

        #[test]
        fn filter_built_from_report_attributes_matches_it(key in "[a-z]{1,6}", value in "[A-Za-z]{0,8}") {
            let report = NewReport::new("sales")
                .with_attribute(key.clone(), value.clone())
                .into_report(ReportId::new("x"), ts(1));
            let filter = ReportFilter::from_pairs([(key, value)]);
            prop_assert!(filter.matches(&report));
        }
    }
}
