//! HTTP client for the sales service.
//!
//! ```text
//! GET {base_url}/sales?startDate=..&endDate=..&reportType=..&status=..&<attr>=..
//! ```
//!
//! Dates are RFC 3339. Attribute values are sent as their string form
//! (JSON encoding for anything that is not already a string).

use reporting_core::report::{DateRange, ReportFilter};
use reporting_core::sales::{PeerError, SalesDataSource};
use reqwest::Client;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

/// Longest response body kept in [`PeerError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// [`SalesDataSource`] over the sales service's REST API.
#[derive(Clone, Debug)]
pub struct HttpSalesClient {
    client: Client,
    base_url: String,
}

impl HttpSalesClient {
    /// Create a client for the service at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Create a client that reuses an existing [`Client`].
    #[must_use]
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn fetch(&self, query: Vec<(String, String)>) -> Result<Value, PeerError> {
        let response = self
            .client
            .get(format!("{}/sales", self.base_url))
            .query(&query)
            .send()
            .await
            .map_err(|e| PeerError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            truncate(&mut body, MAX_ERROR_BODY);
            return Err(PeerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| PeerError::InvalidResponse(e.to_string()))
    }
}

impl SalesDataSource for HttpSalesClient {
    fn fetch_sales(
        &self,
        date_range: Option<&DateRange>,
        filter: &ReportFilter,
    ) -> Pin<Box<dyn Future<Output = Result<Value, PeerError>> + Send + '_>> {
        let query = query_pairs(date_range, filter);
        Box::pin(async move {
            tracing::debug!(base_url = %self.base_url, params = query.len(), "Fetching sales data");
            self.fetch(query).await
        })
    }
}

fn query_pairs(date_range: Option<&DateRange>, filter: &ReportFilter) -> Vec<(String, String)> {
    let mut query = Vec::new();
    if let Some(range) = date_range {
        query.push(("startDate".to_string(), range.start().to_rfc3339()));
        query.push(("endDate".to_string(), range.end().to_rfc3339()));
    }
    if let Some(report_type) = &filter.report_type {
        query.push(("reportType".to_string(), report_type.clone()));
    }
    if let Some(status) = &filter.status {
        query.push(("status".to_string(), status.clone()));
    }
    for (key, value) in &filter.attributes {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        query.push((key.clone(), value));
    }
    query
}

fn truncate(body: &mut String, max: usize) {
    if body.len() > max {
        let mut cut = max;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::Query, http::StatusCode, routing::get};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::collections::HashMap;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn january() -> DateRange {
        DateRange::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 31, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_query_pairs() {
        let filter = ReportFilter::all()
            .with_report_type("sales")
            .with_attribute("region", "North")
            .with_attribute("tier", 2);

        let query: HashMap<_, _> = query_pairs(Some(&january()), &filter).into_iter().collect();

        assert_eq!(query["startDate"], "2025-01-01T00:00:00+00:00");
        assert_eq!(query["endDate"], "2025-01-31T00:00:00+00:00");
        assert_eq!(query["reportType"], "sales");
        assert_eq!(query["region"], "North");
        assert_eq!(query["tier"], "2");
        assert!(!query.contains_key("status"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let mut body = "é".repeat(10);
        truncate(&mut body, 5);
        assert_eq!(body, "éé");
    }

    #[tokio::test]
    async fn test_fetch_sales_forwards_query_and_returns_body() {
        let app = Router::new().route(
            "/sales",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                Json(json!({ "total": 1200, "echo": params }))
            }),
        );
        let client = HttpSalesClient::new(format!("{}/", serve(app).await));

        let body = client
            .fetch_sales(Some(&january()), &ReportFilter::all().with_report_type("sales"))
            .await
            .unwrap();

        assert_eq!(body["total"], 1200);
        assert_eq!(body["echo"]["reportType"], "sales");
        assert_eq!(body["echo"]["startDate"], "2025-01-01T00:00:00+00:00");
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let app = Router::new().route(
            "/sales",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down for maintenance") }),
        );
        let client = HttpSalesClient::new(serve(app).await);

        let err = client.fetch_sales(None, &ReportFilter::all()).await.unwrap_err();

        assert_eq!(
            err,
            PeerError::Status {
                status: 503,
                body: "down for maintenance".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_non_json_body_is_invalid_response() {
        let app = Router::new().route("/sales", get(|| async { "not json" }));
        let client = HttpSalesClient::new(serve(app).await);

        let err = client.fetch_sales(None, &ReportFilter::all()).await.unwrap_err();

        assert!(matches!(err, PeerError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_peer() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = HttpSalesClient::new(format!("http://{addr}"));

        let err = client.fetch_sales(None, &ReportFilter::all()).await.unwrap_err();

        assert!(matches!(err, PeerError::Unreachable(_)));
    }
}
