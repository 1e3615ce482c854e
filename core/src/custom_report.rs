//! Request and response shapes for custom report generation.

use crate::report::{DateRange, Report, ReportFilter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ask for every report of one type, optionally narrowed, plus sales figures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomReportRequest {
    /// Report type to aggregate over
    pub report_type: String,
    /// Window forwarded to the sales peer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    /// Extra predicates (status, attributes)
    #[serde(default, alias = "filters")]
    pub filter: ReportFilter,
}

impl CustomReportRequest {
    /// Request every report of `report_type`.
    #[must_use]
    pub fn new(report_type: impl Into<String>) -> Self {
        Self {
            report_type: report_type.into(),
            date_range: None,
            filter: ReportFilter::default(),
        }
    }

    /// Narrow by `filter`.
    #[must_use]
    pub fn with_filter(mut self, filter: ReportFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Set the sales window.
    #[must_use]
    pub const fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }
}

/// Sales figures attached to a custom report.
///
/// Serialized with a `status` tag: `{"status":"available","data":...}` or
/// `{"status":"unavailable","reason":...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SalesData {
    /// The peer answered
    Available {
        /// Opaque peer response
        data: serde_json::Value,
    },
    /// The peer failed or timed out
    Unavailable {
        /// Failure description
        reason: String,
    },
}

impl SalesData {
    /// `true` when the peer answered.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }
}

/// A generated custom report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomReport {
    /// Report type aggregated over
    pub report_type: String,
    /// Window that was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    /// When generation ran
    pub generated_at: DateTime<Utc>,
    /// Matching reports, newest first
    pub reports: Vec<Report>,
    /// Peer figures, or why they are missing
    pub sales: SalesData,
}

/// Cache key a generated report is memoized under.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use reporting_core::custom_report::custom_report_cache_key;
///
/// let at = Utc.timestamp_millis_opt(1_704_067_200_000).unwrap();
/// assert_eq!(custom_report_cache_key("sales", at), "custom-report-sales-1704067200000");
/// ```
#[must_use]
pub fn custom_report_cache_key(report_type: &str, at: DateTime<Utc>) -> String {
    format!("custom-report-{report_type}-{}", at.timestamp_millis())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sales_data_is_status_tagged() {
        let unavailable = SalesData::Unavailable {
            reason: "timeout".into(),
        };
        assert_eq!(
            serde_json::to_value(&unavailable).unwrap(),
            json!({ "status": "unavailable", "reason": "timeout" })
        );

        let available = SalesData::Available {
            data: json!({ "total": 10 }),
        };
        assert_eq!(
            serde_json::to_value(&available).unwrap(),
            json!({ "status": "available", "data": { "total": 10 } })
        );
    }

    #[test]
    fn request_accepts_minimal_body() {
        let request: CustomReportRequest =
            serde_json::from_value(json!({ "reportType": "sales" })).unwrap();
        assert_eq!(request, CustomReportRequest::new("sales"));
    }

    #[test]
    fn request_accepts_filters_alias() {
        let request: CustomReportRequest = serde_json::from_value(json!({
            "reportType": "sales",
            "filters": { "status": "completed", "attributes": { "region": "North" } }
        }))
        .unwrap();
        assert_eq!(request.filter.status.as_deref(), Some("completed"));
        assert_eq!(request.filter.attributes["region"], "North");
    }
}
