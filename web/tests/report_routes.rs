//! End-to-end tests for the HTTP surface over in-memory ports.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::http::StatusCode;
use axum_test::TestServer;
use reporting_runtime::ReportLifecycle;
use reporting_testing::{
    InMemoryCacheStore, InMemoryEventBus, InMemoryReportStore, StubSalesSource, test_clock,
};
use reporting_web::{AppState, CORRELATION_ID_HEADER, router};
use serde_json::{Value, json};
use std::sync::Arc;

struct Harness {
    server: TestServer,
    store: InMemoryReportStore,
    cache: InMemoryCacheStore,
    bus: InMemoryEventBus,
}

fn harness_with_sales(sales: StubSalesSource) -> Harness {
    let store = InMemoryReportStore::new();
    let cache = InMemoryCacheStore::new();
    let bus = InMemoryEventBus::new();
    let lifecycle = ReportLifecycle::builder()
        .store(Arc::new(store.clone()))
        .cache(Arc::new(cache.clone()))
        .events(Arc::new(bus.clone()))
        .sales(Arc::new(sales))
        .clock(Arc::new(test_clock()))
        .build()
        .unwrap();
    let server = TestServer::new(router(AppState::new(lifecycle))).unwrap();
    Harness {
        server,
        store,
        cache,
        bus,
    }
}

fn harness() -> Harness {
    harness_with_sales(StubSalesSource::returning(json!({ "total": 1200 })))
}

fn north_sales() -> Value {
    json!({
        "reportType": "sales",
        "reportName": "North sales",
        "attributes": { "region": "North" },
        "dateRange": { "start": "2025-01-01", "end": "2025-01-31" }
    })
}

#[tokio::test]
async fn create_returns_201_and_caches_and_publishes() {
    let h = harness();

    let response = h.server.post("/reports").json(&north_sales()).await;

    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["id"], "R1");
    assert_eq!(body["reportType"], "sales");
    assert_eq!(body["attributes"]["region"], "North");
    assert!(h.cache.contains_key("report-R1"));
    assert_eq!(h.bus.published_to("report-created").len(), 1);
}

#[tokio::test]
async fn create_accepts_filters_alias() {
    let h = harness();

    let response = h
        .server
        .post("/reports")
        .json(&json!({ "reportType": "sales", "filters": { "region": "South" } }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["attributes"]["region"], "South");
}

#[tokio::test]
async fn blank_report_type_is_422_and_touches_nothing() {
    let h = harness();

    let response = h
        .server
        .post("/reports")
        .json(&json!({ "reportType": "   " }))
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(h.store.is_empty());
    assert!(h.bus.published().is_empty());
}

#[tokio::test]
async fn inverted_date_range_is_422() {
    let h = harness();

    let response = h
        .server
        .post("/reports")
        .json(&json!({
            "reportType": "sales",
            "dateRange": { "start": "2025-02-01", "end": "2025-01-01" }
        }))
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn store_failure_is_500_with_generic_message() {
    let h = harness();
    h.store.set_failing(true);

    let response = h.server.post("/reports").json(&north_sales()).await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["code"], "INTERNAL_SERVER_ERROR");
    assert!(h.cache.keys().is_empty());
}

#[tokio::test]
async fn get_returns_report_or_404() {
    let h = harness();
    h.server.post("/reports").json(&north_sales()).await;

    let found = h.server.get("/reports/R1").await;
    found.assert_status(StatusCode::OK);
    assert_eq!(found.json::<Value>()["reportName"], "North sales");

    let missing = h.server.get("/reports/R404").await;
    missing.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(missing.json::<Value>()["code"], "NOT_FOUND");
}

#[tokio::test]
async fn list_filters_by_query_parameters() {
    let h = harness();
    h.server.post("/reports").json(&north_sales()).await;
    h.server
        .post("/reports")
        .json(&json!({ "reportType": "sales", "attributes": { "region": "South" } }))
        .await;
    h.server
        .post("/reports")
        .json(&json!({ "reportType": "inventory", "attributes": { "region": "North" } }))
        .await;

    let all: Vec<Value> = h.server.get("/reports").await.json();
    assert_eq!(all.len(), 3);

    let response = h
        .server
        .get("/reports")
        .add_query_param("reportType", "sales")
        .add_query_param("region", "North")
        .await;
    response.assert_status(StatusCode::OK);
    let filtered: Vec<Value> = response.json();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0]["id"], "R1");
}

#[tokio::test]
async fn update_merges_and_refreshes_cache() {
    let h = harness();
    h.server.post("/reports").json(&north_sales()).await;

    let response = h
        .server
        .put("/reports/R1")
        .json(&json!({ "status": "final", "attributes": { "reviewed": true } }))
        .await;

    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "final");
    assert_eq!(body["attributes"]["region"], "North");
    assert_eq!(body["attributes"]["reviewed"], true);
    let cached = h.cache.peek_json("report-R1").unwrap();
    assert_eq!(cached["status"], "final");
    assert_eq!(h.bus.published_to("report-updated").len(), 1);
}

#[tokio::test]
async fn update_unknown_id_is_404_without_side_effects() {
    let h = harness();

    let response = h
        .server
        .put("/reports/R404")
        .json(&json!({ "status": "final" }))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    assert!(h.bus.published().is_empty());
}

#[tokio::test]
async fn malformed_body_is_422() {
    let h = harness();

    let response = h
        .server
        .post("/reports")
        .content_type("application/json")
        .bytes("{\"reportType\":".into())
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn delete_returns_message_and_report_then_404() {
    let h = harness();
    h.server.post("/reports").json(&north_sales()).await;

    let response = h.server.delete("/reports/R1").await;

    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["message"], "Report deleted successfully");
    assert_eq!(body["report"]["id"], "R1");
    assert!(!h.cache.contains_key("report-R1"));
    assert_eq!(h.bus.published_to("report-deleted").len(), 1);

    h.server
        .get("/reports/R1")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    h.server
        .delete("/reports/R1")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn custom_report_includes_matching_reports_and_sales() {
    let h = harness();
    h.server.post("/reports").json(&north_sales()).await;
    h.server
        .post("/reports")
        .json(&json!({ "reportType": "sales", "attributes": { "region": "South" } }))
        .await;

    let response = h
        .server
        .post("/reports/custom")
        .json(&json!({ "reportType": "sales" }))
        .await;

    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["reportType"], "sales");
    assert_eq!(body["reports"].as_array().unwrap().len(), 2);
    assert_eq!(body["sales"]["status"], "available");
    assert_eq!(body["sales"]["data"]["total"], 1200);
}

#[tokio::test]
async fn custom_report_degrades_when_sales_peer_fails() {
    let h = harness_with_sales(StubSalesSource::failing(
        reporting_core::sales::PeerError::Unreachable("connection refused".into()),
    ));
    h.server.post("/reports").json(&north_sales()).await;

    let response = h
        .server
        .post("/reports/custom")
        .json(&json!({ "reportType": "sales" }))
        .await;

    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["sales"]["status"], "unavailable");
    assert_eq!(body["reports"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn legacy_api_prefix_serves_the_same_routes() {
    let h = harness();

    h.server
        .post("/api/reports")
        .json(&north_sales())
        .await
        .assert_status(StatusCode::CREATED);
    h.server
        .get("/reports/R1")
        .await
        .assert_status(StatusCode::OK);
}

#[tokio::test]
async fn health_and_correlation_header() {
    let h = harness();

    let response = h.server.get("/health").await;

    response.assert_status(StatusCode::OK);
    assert_eq!(response.json::<Value>(), json!({ "status": "ok" }));
    assert!(!response.header(CORRELATION_ID_HEADER).is_empty());
}

#[tokio::test]
async fn metrics_without_recorder_is_503() {
    let h = harness();

    h.server
        .get("/metrics")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
}
