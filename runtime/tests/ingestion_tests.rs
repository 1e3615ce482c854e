//! Integration tests for event ingestion.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use reporting_core::error::{IngestionError, ReportError};
use reporting_core::event::SerializedEvent;
use reporting_core::event_bus::{Disposition, EventBusError};
use reporting_core::report::ReportFilter;
use reporting_core::telemetry::{IngestionOutcome, Operation, OperationStatus};
use reporting_runtime::{IngestionHandler, IngestionStats, IngestionWorker, ReportLifecycle};
use reporting_testing::{
    InMemoryCacheStore, InMemoryEventBus, InMemoryReportStore, RecordingTelemetry,
    StubSalesSource, test_clock,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    lifecycle: ReportLifecycle,
    store: InMemoryReportStore,
    bus: InMemoryEventBus,
    telemetry: RecordingTelemetry,
}

fn harness() -> Harness {
    let store = InMemoryReportStore::new();
    let bus = InMemoryEventBus::new();
    let telemetry = RecordingTelemetry::new();
    let lifecycle = ReportLifecycle::builder()
        .store(Arc::new(store.clone()))
        .cache(Arc::new(InMemoryCacheStore::new()))
        .events(Arc::new(bus.clone()))
        .sales(Arc::new(StubSalesSource::default()))
        .telemetry(Arc::new(telemetry.clone()))
        .clock(Arc::new(test_clock()))
        .build()
        .unwrap();
    Harness {
        lifecycle,
        store,
        bus,
        telemetry,
    }
}

fn raw(topic: &str, body: &[u8]) -> SerializedEvent {
    SerializedEvent::new(topic.to_string(), body.to_vec(), None)
}

/// Spawn a worker and wait until its subscription is registered.
async fn spawn_worker(
    worker: IngestionWorker,
) -> tokio::task::JoinHandle<Result<IngestionStats, EventBusError>> {
    let handle = tokio::spawn(worker.run(std::future::pending::<()>()));
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle
}

// ============================================================================
// Handler
// ============================================================================

#[tokio::test]
async fn object_body_becomes_attributes_under_sentinel_type() {
    let h = harness();
    let handler = IngestionHandler::new("customer-events", h.lifecycle.clone());

    let report = handler
        .handle(&raw("customer-events", br#"{"customerId":"C-7","kind":"signup"}"#))
        .await
        .unwrap();

    assert_eq!(report.report_type, "CUSTOMER_EVENT");
    assert_eq!(report.status.as_deref(), Some("processed"));
    assert_eq!(report.attributes["customerId"], "C-7");
    assert_eq!(report.attributes["kind"], "signup");
    assert_eq!(h.bus.published_to("report-created").len(), 1);
}

#[tokio::test]
async fn non_object_body_is_wrapped() {
    let h = harness();
    let handler = IngestionHandler::new("customer-events", h.lifecycle.clone());

    let payload = handler.to_new_report(&raw("customer-events", b"[1,2,3]")).unwrap();

    assert_eq!(payload.attributes.get("data"), Some(&json!([1, 2, 3])));
    assert_eq!(payload.attributes.len(), 1);
}

#[tokio::test]
async fn invalid_json_is_malformed() {
    let h = harness();
    let handler = IngestionHandler::new("customer-events", h.lifecycle.clone());

    let error = handler
        .handle(&raw("customer-events", b"{not json"))
        .await
        .unwrap_err();

    assert!(matches!(error, IngestionError::Malformed { ref topic, .. } if topic == "customer-events"));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn store_failure_is_downstream() {
    let h = harness();
    h.store.set_failing(true);
    let handler = IngestionHandler::new("customer-events", h.lifecycle.clone());

    let error = handler
        .handle(&raw("customer-events", b"{}"))
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        IngestionError::Downstream {
            source: ReportError::Persistence(_),
            ..
        }
    ));
}

// ============================================================================
// Worker
// ============================================================================

#[tokio::test]
async fn malformed_event_is_parked_on_dead_letter_topic() {
    let h = harness();
    let worker = IngestionWorker::new(IngestionHandler::new("customer-events", h.lifecycle.clone()));
    assert_eq!(worker.dead_letter_topic(), "customer-events.dlq");

    let outcome = worker
        .process(raw("customer-events", b"garbage").with_key("k1"))
        .await;

    assert_eq!(outcome, IngestionOutcome::Parked);
    let parked = h.bus.published_to("customer-events.dlq");
    assert_eq!(parked.len(), 1);
    assert_eq!(parked[0].data, b"garbage".to_vec());
    assert_eq!(parked[0].key.as_deref(), Some("k1"));
    let metadata = parked[0].metadata.as_ref().unwrap();
    assert_eq!(metadata["source_topic"], "customer-events");
    assert!(metadata["error"].as_str().unwrap().contains("Malformed"));
    assert_eq!(
        h.telemetry.ingestions(),
        vec![("customer-events".to_string(), IngestionOutcome::Parked)]
    );
}

#[tokio::test]
async fn unparkable_event_is_requeued() {
    let h = harness();
    h.bus.fail_topic("audit");
    let worker = IngestionWorker::new(IngestionHandler::new("customer-events", h.lifecycle.clone()))
        .with_dead_letter_topic("audit");

    let outcome = worker.process(raw("customer-events", b"garbage")).await;

    assert_eq!(outcome, IngestionOutcome::Requeued);
    assert_eq!(
        h.telemetry.ingestions(),
        vec![("customer-events".to_string(), IngestionOutcome::Requeued)]
    );
}

#[tokio::test]
async fn requeued_event_is_nacked_and_redelivered_until_it_lands() {
    let h = harness();
    h.store.set_failing(true);
    h.bus.fail_topic("customer-events.dlq");
    let worker = IngestionWorker::new(IngestionHandler::new("customer-events", h.lifecycle.clone()))
        .with_redelivery_delay(Duration::from_millis(5));
    let handle = spawn_worker(worker).await;

    h.bus.deliver_raw("customer-events", br#"{"customerId":"C-9"}"#);
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Neither the store nor the dead-letter topic took it: never acked.
    assert!(h.store.is_empty());
    assert_eq!(h.bus.settled("customer-events", Disposition::Ack), 0);
    assert!(h.bus.settled("customer-events", Disposition::Nack) >= 1);

    h.store.set_failing(false);
    tokio::time::timeout(Duration::from_secs(1), async {
        while h.store.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("redelivered event should become a report");
    h.bus.close_subscriptions();

    let stats = handle.await.unwrap().unwrap();
    assert_eq!(stats.created, 1);
    assert!(stats.requeued >= 1);
    assert_eq!(stats.parked, 0);
    assert_eq!(h.store.len(), 1);
    assert_eq!(h.bus.settled("customer-events", Disposition::Ack), 1);
    assert!(h.bus.published_to("customer-events.dlq").is_empty());
}

#[tokio::test]
async fn parked_and_created_events_are_acked() {
    let h = harness();
    let worker = IngestionWorker::new(IngestionHandler::new("customer-events", h.lifecycle.clone()));
    let handle = spawn_worker(worker).await;

    h.bus.deliver_raw("customer-events", br#"{"n":1}"#);
    h.bus.deliver_raw("customer-events", b"not json");
    h.bus.close_subscriptions();
    handle.await.unwrap().unwrap();

    assert_eq!(
        h.bus.settlements(),
        vec![
            ("customer-events".to_string(), Disposition::Ack),
            ("customer-events".to_string(), Disposition::Ack),
        ]
    );
}

#[tokio::test]
async fn shutdown_during_redelivery_wait_leaves_event_unacked() {
    let h = harness();
    h.store.set_failing(true);
    h.bus.fail_topic("customer-events.dlq");
    let worker = IngestionWorker::new(IngestionHandler::new("customer-events", h.lifecycle.clone()))
        .with_redelivery_delay(Duration::from_secs(60));
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(worker.run(async move {
        let _ = rx.await;
    }));
    tokio::time::sleep(Duration::from_millis(20)).await;

    h.bus.deliver_raw("customer-events", br#"{"n":1}"#);
    tokio::time::sleep(Duration::from_millis(20)).await;
    tx.send(()).unwrap();

    let stats = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("shutdown should cut the redelivery wait short")
        .unwrap()
        .unwrap();
    assert_eq!(stats.requeued, 1);
    assert_eq!(h.bus.settled("customer-events", Disposition::Ack), 0);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn duplicate_delivery_creates_duplicate_reports() {
    let h = harness();
    let worker = IngestionWorker::new(IngestionHandler::new("customer-events", h.lifecycle.clone()));
    let body = br#"{"customerId":"C-1"}"#;

    worker.process(raw("customer-events", body)).await;
    worker.process(raw("customer-events", body)).await;

    let ingested = h
        .lifecycle
        .list(&ReportFilter::all().with_report_type("CUSTOMER_EVENT"))
        .await
        .unwrap();
    assert_eq!(ingested.len(), 2);
    assert_ne!(ingested[0].id, ingested[1].id);
    assert_eq!(ingested[0].attributes, ingested[1].attributes);
}

#[tokio::test]
async fn worker_survives_stream_errors_and_stops_when_stream_ends() {
    let h = harness();
    let worker = IngestionWorker::new(IngestionHandler::new("customer-events", h.lifecycle.clone()));
    let handle = spawn_worker(worker).await;

    h.bus.deliver_raw("customer-events", br#"{"n":1}"#);
    h.bus.inject_error(
        "customer-events",
        EventBusError::TransportError("broker hiccup".into()),
    );
    h.bus.deliver_raw("customer-events", b"oops");
    h.bus.deliver_raw("customer-events", br#"{"n":2}"#);
    h.bus.close_subscriptions();

    let stats = handle.await.unwrap().unwrap();

    assert_eq!(
        stats,
        IngestionStats {
            created: 2,
            parked: 1,
            requeued: 0,
            stream_errors: 1,
        }
    );
    assert_eq!(h.store.len(), 2);
    assert_eq!(h.telemetry.count(Operation::Create, OperationStatus::Success), 2);
}

#[tokio::test]
async fn worker_stops_on_shutdown_signal() {
    let h = harness();
    let worker = IngestionWorker::new(IngestionHandler::new("customer-events", h.lifecycle.clone()));
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let handle = tokio::spawn(worker.run(async move {
        let _ = rx.await;
    }));
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.bus.deliver_raw("customer-events", br#"{"n":1}"#);
    tokio::time::sleep(Duration::from_millis(20)).await;
    tx.send(()).unwrap();

    let stats = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("worker should stop after shutdown")
        .unwrap()
        .unwrap();
    assert_eq!(stats.created, 1);
}

#[tokio::test]
async fn worker_ignores_other_topics() {
    let h = harness();
    let worker = IngestionWorker::new(IngestionHandler::new("customer-events", h.lifecycle.clone()));
    let handle = spawn_worker(worker).await;

    h.bus.deliver_raw("order-events", br#"{"n":1}"#);
    h.bus.close_subscriptions();

    let stats = handle.await.unwrap().unwrap();
    assert_eq!(stats, IngestionStats::default());
    assert!(h.store.is_empty());
}
