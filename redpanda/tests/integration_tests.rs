//! Integration tests for [`RedpandaEventBus`] against a real Kafka-compatible broker.
//!
//! These tests are `#[ignore]`d by default because they need Docker and take
//! a while to start the broker.
//!
//! ```bash
//! cargo test -p reporting-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use futures::StreamExt;
use reporting_core::event::SerializedEvent;
use reporting_core::event_bus::{Delivery, EventBus, EventStream};
use reporting_redpanda::RedpandaEventBus;
use serde_json::json;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};

fn warmup() -> SerializedEvent {
    SerializedEvent::new("warmup".to_string(), b"{}".to_vec(), None)
}

async fn start_broker() -> (ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");

    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    (kafka, format!("{host}:{port}"))
}

/// Publish warmup events until the topic exists and metadata has propagated.
async fn ensure_topic_exists(event_bus: &RedpandaEventBus, topic: &str) {
    for attempt in 1..=60 {
        if event_bus.publish(topic, &warmup()).await.is_ok() {
            tokio::time::sleep(Duration::from_secs(3)).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(attempt != 60, "Failed to create topic {topic}");
    }
}

/// Next delivery that is not a warmup. Warmups are acked on the way.
async fn next_delivery(stream: &mut EventStream) -> Delivery {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let Some(result) = stream.next().await else {
                panic!("Stream ended early");
            };
            let delivery = result.expect("Failed to receive event");
            if delivery.event.event_type != "warmup" {
                return delivery;
            }
            delivery.ack.ack();
        }
    })
    .await
    .expect("Timeout waiting for event")
}

async fn next_non_warmup(stream: &mut EventStream) -> SerializedEvent {
    let Delivery { event, ack } = next_delivery(stream).await;
    ack.ack();
    event
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn report_event_round_trips_with_key_and_metadata() {
    let (_kafka, brokers) = start_broker().await;
    let event_bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .auto_offset_reset("earliest")
        .build()
        .expect("Failed to create event bus");
    ensure_topic_exists(&event_bus, "report-created").await;

    let mut stream = event_bus
        .subscribe(&["report-created"])
        .await
        .expect("Failed to subscribe");
    tokio::time::sleep(Duration::from_secs(2)).await;

    let event = SerializedEvent::new(
        "ReportCreated.v1".to_string(),
        br#"{"action":"created","reportId":"R1","occurredAt":"2025-01-01T00:00:00Z"}"#.to_vec(),
        Some(json!({"correlation_id": "abc"})),
    )
    .with_key("R1");
    event_bus
        .publish("report-created", &event)
        .await
        .expect("Failed to publish");

    let received = next_non_warmup(&mut stream).await;
    assert_eq!(received, event);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn foreign_records_take_the_topic_as_event_type() {
    use rdkafka::config::ClientConfig;
    use rdkafka::producer::{FutureProducer, FutureRecord};

    let (_kafka, brokers) = start_broker().await;
    let event_bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .auto_offset_reset("earliest")
        .build()
        .expect("Failed to create event bus");
    ensure_topic_exists(&event_bus, "customer-events").await;

    let mut stream = event_bus
        .subscribe(&["customer-events"])
        .await
        .expect("Failed to subscribe");
    tokio::time::sleep(Duration::from_secs(2)).await;

    // A producer that knows nothing about our headers.
    let foreign: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", &brokers)
        .create()
        .expect("Failed to create producer");
    foreign
        .send(
            FutureRecord::<str, str>::to("customer-events").payload(r#"{"customerId":"C-7"}"#),
            Duration::from_secs(5),
        )
        .await
        .expect("Failed to send foreign record");

    let received = next_non_warmup(&mut stream).await;
    assert_eq!(received.event_type, "customer-events");
    assert_eq!(received.data, br#"{"customerId":"C-7"}"#.to_vec());
    assert!(received.key.is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn nacked_record_is_read_again_before_later_records() {
    let (_kafka, brokers) = start_broker().await;
    let event_bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .auto_offset_reset("earliest")
        .build()
        .expect("Failed to create event bus");
    ensure_topic_exists(&event_bus, "customer-events").await;

    let first = SerializedEvent::new("CustomerCreated".to_string(), b"{\"n\":1}".to_vec(), None);
    let second = SerializedEvent::new("CustomerCreated".to_string(), b"{\"n\":2}".to_vec(), None);
    event_bus
        .publish("customer-events", &first)
        .await
        .expect("Failed to publish first event");
    event_bus
        .publish("customer-events", &second)
        .await
        .expect("Failed to publish second event");

    let mut stream = event_bus
        .subscribe(&["customer-events"])
        .await
        .expect("Failed to subscribe");

    let delivery = next_delivery(&mut stream).await;
    assert_eq!(delivery.event, first);
    delivery.ack.nack();

    assert_eq!(next_non_warmup(&mut stream).await, first);
    assert_eq!(next_non_warmup(&mut stream).await, second);
}
