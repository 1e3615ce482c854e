//! Redpanda event bus for the reporting write path.
//!
//! [`RedpandaEventBus`] implements the [`EventBus`] port from `reporting-core`
//! with rdkafka, so it works against Redpanda or any Kafka-compatible broker.
//! It serves both directions:
//!
//! ```text
//! ┌─────────────────┐  report-created   ┌──────────┐
//! │ ReportLifecycle │──report-updated──►│          │
//! └─────────────────┘  report-deleted   │ Redpanda │
//! ┌─────────────────┐                   │          │
//! │ IngestionWorker │◄─customer-events──│          │
//! └─────────────────┘                   └──────────┘
//! ```
//!
//! Records carry the raw JSON body as payload; see [`envelope`] for how the
//! event type, key, and metadata travel.
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - Each record reaches the subscriber as a [`Delivery`]. The consumer waits
//!   for it to be settled before reading the next record.
//! - An ack commits the record's offset.
//! - A nack (or a dropped acknowledger) seeks the partition back to the
//!   record, so it is read again. Nothing is committed past it.
//! - If the process stops before the ack, the record is redelivered after
//!   restart.
//! - Nothing is deduplicated. A redelivered inbound event creates a second
//!   report.
//!
//! # Example
//!
//! ```no_run
//! use reporting_redpanda::RedpandaEventBus;
//! use reporting_core::event_bus::EventBus;
//! use reporting_core::event::SerializedEvent;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedpandaEventBus::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("crm-reporting")
//!     .build()?;
//!
//! let event = SerializedEvent::new(
//!     "ReportCreated.v1".to_string(),
//!     br#"{"action":"created","reportId":"R1"}"#.to_vec(),
//!     None,
//! )
//! .with_key("R1");
//! event_bus.publish("report-created", &event).await?;
//!
//! let mut stream = event_bus.subscribe(&["customer-events"]).await?;
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(delivery) => {
//!             println!("Received: {}", delivery.event.event_type);
//!             delivery.ack.ack();
//!         }
//!         Err(e) => eprintln!("Error: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod envelope;

use rdkafka::config::ClientConfig;
use rdkafka::Offset;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use reporting_core::event::SerializedEvent;
use reporting_core::event_bus::{
    Acknowledger, Delivery, Disposition, EventBus, EventBusError, EventStream,
};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Redpanda-backed [`EventBus`].
///
/// One producer is shared by every publish. Each `subscribe` call creates its
/// own consumer, owned by a background task that hands records to the
/// subscriber one at a time and commits each only once it is acked.
///
/// # Configuration
///
/// - **Brokers**: bootstrap servers (required)
/// - **Producer**: acks, compression, send timeout
/// - **Consumer group**: explicit id, or derived from the subscribed topics
/// - **Buffer size**: stream errors buffered per subscription (default: 1000)
/// - **Offset reset**: where a new group starts reading (default: "latest")
pub struct RedpandaEventBus {
    /// Kafka producer for publishing events
    producer: FutureProducer,
    /// Broker addresses (for creating consumers)
    brokers: String,
    /// Producer timeout
    timeout: Duration,
    /// Consumer group ID (if explicitly set)
    consumer_group: Option<String>,
    /// Event buffer size for subscribers
    buffer_size: usize,
    /// Auto offset reset policy
    auto_offset_reset: String,
}

impl RedpandaEventBus {
    /// Create an event bus with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be
    /// created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// The configured bootstrap servers.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    fn consumer_group_for(&self, topics: &[String]) -> String {
        self.consumer_group.clone().unwrap_or_else(|| {
            let mut sorted_topics = topics.to_vec();
            sorted_topics.sort();
            format!("crm-reporting-{}", sorted_topics.join("-"))
        })
    }
}

/// Builder for configuring a [`RedpandaEventBus`].
///
/// # Example
///
/// ```no_run
/// use reporting_redpanda::RedpandaEventBus;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let event_bus = RedpandaEventBus::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .producer_acks("all")
///     .compression("lz4")
///     .timeout(Duration::from_secs(10))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
}

impl RedpandaEventBusBuilder {
    /// Set the broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode: "0", "1", or "all".
    ///
    /// Default: "1"
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec: "none", "gzip", "snappy", "lz4", or "zstd".
    ///
    /// Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the consumer group ID for subscriptions.
    ///
    /// Instances sharing a group split the inbound partitions between them.
    /// Without one, the group is derived from the subscribed topics.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Set the capacity of each subscription's hand-off channel.
    ///
    /// A zero size is raised to one.
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size.max(1));
        self
    }

    /// Set where a new consumer group starts reading: "earliest", "latest",
    /// or "error".
    ///
    /// Default: "latest"
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the brokers are not set
    /// or the producer cannot be created.
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self.brokers.ok_or_else(|| {
            EventBusError::ConnectionFailed("Brokers not configured".to_string())
        })?;
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));

        let mut producer_config = ClientConfig::new();
        producer_config
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", self.producer_acks.as_deref().unwrap_or("1"))
            .set("compression.type", self.compression.as_deref().unwrap_or("none"));

        let producer: FutureProducer = producer_config.create().map_err(|e| {
            EventBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
        })?;

        tracing::info!(
            brokers = %brokers,
            acks = self.producer_acks.as_deref().unwrap_or("1"),
            compression = self.compression.as_deref().unwrap_or("none"),
            buffer_size = self.buffer_size.unwrap_or(1000),
            auto_offset_reset = self.auto_offset_reset.as_deref().unwrap_or("latest"),
            "RedpandaEventBus created successfully"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout,
            consumer_group: self.consumer_group,
            buffer_size: self.buffer_size.unwrap_or(1000),
            auto_offset_reset: self.auto_offset_reset.unwrap_or_else(|| "latest".to_string()),
        })
    }
}

impl EventBus for RedpandaEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let headers =
                envelope::headers_for(&event).map_err(|e| EventBusError::PublishFailed {
                    topic: topic.clone(),
                    reason: format!("Failed to encode metadata: {e}"),
                })?;

            let mut record = FutureRecord::<str, [u8]>::to(&topic)
                .payload(&event.data)
                .headers(headers);
            // Keyed records keep every event for one report on one partition.
            if let Some(key) = event.key.as_deref() {
                record = record.key(key);
            }

            match self.producer.send(record, Timeout::After(timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        partition,
                        offset,
                        event_type = %event.event_type,
                        key = ?event.key,
                        "Event published successfully"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %topic,
                        error = %kafka_error,
                        "Failed to publish event"
                    );
                    Err(EventBusError::PublishFailed {
                        topic,
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();

        Box::pin(async move {
            let consumer_group_id = self.consumer_group_for(&topics);

            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &self.brokers)
                .set("group.id", &consumer_group_id)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &self.auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to create consumer: {e}"),
                })?;

            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topic_refs)
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to subscribe to topics: {e}"),
                })?;

            tracing::info!(
                topics = ?topics,
                consumer_group = %consumer_group_id,
                buffer_size = self.buffer_size,
                auto_offset_reset = %self.auto_offset_reset,
                manual_commit = true,
                "Subscribed to topics"
            );

            let (tx, rx) = tokio::sync::mpsc::channel(self.buffer_size);
            tokio::spawn(forward(consumer, tx));

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as EventStream)
        })
    }
}

/// How long a nack may take to rewind a partition.
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// Own `consumer` and hand decoded records to `tx` until the receiver goes
/// away.
///
/// Each record waits for its delivery to be settled. An ack commits the
/// offset; a nack seeks the partition back so the record is read again.
/// Undecodable records are forwarded as errors and committed, so they are not
/// retried forever.
async fn forward(
    consumer: StreamConsumer,
    tx: tokio::sync::mpsc::Sender<Result<Delivery, EventBusError>>,
) {
    use futures::StreamExt;

    let mut stream = consumer.stream();

    while let Some(msg_result) = stream.next().await {
        let message = match msg_result {
            Ok(message) => message,
            Err(e) => {
                let err = EventBusError::TransportError(format!("Failed to receive message: {e}"));
                if tx.send(Err(err)).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let event = match envelope::decode(&message) {
            Ok(event) => event,
            Err(e) => {
                if tx.send(Err(e)).await.is_err() {
                    break;
                }
                commit(&consumer, &message);
                continue;
            }
        };
        tracing::trace!(
            topic = message.topic(),
            partition = message.partition(),
            offset = message.offset(),
            event_type = %event.event_type,
            "Received event"
        );

        let (settled_tx, settled_rx) = tokio::sync::oneshot::channel();
        let ack = Acknowledger::new(move |disposition| {
            let _ = settled_tx.send(disposition);
        });
        if tx.send(Ok(Delivery::new(event, ack))).await.is_err() {
            tracing::debug!("Channel receiver dropped, exiting consumer task");
            break;
        }

        match settled_rx.await.unwrap_or(Disposition::Nack) {
            Disposition::Ack => commit(&consumer, &message),
            Disposition::Nack => {
                tracing::debug!(
                    topic = message.topic(),
                    partition = message.partition(),
                    offset = message.offset(),
                    "Delivery nacked, rewinding partition"
                );
                if let Err(e) = consumer.seek(
                    message.topic(),
                    message.partition(),
                    Offset::Offset(message.offset()),
                    SEEK_TIMEOUT,
                ) {
                    // Reading on would let a later commit cover this record.
                    tracing::error!(
                        topic = message.topic(),
                        partition = message.partition(),
                        offset = message.offset(),
                        error = %e,
                        "Failed to rewind partition, stopping consumer"
                    );
                    let err = EventBusError::ConsumerGroupError(format!(
                        "Failed to rewind {}[{}] to offset {}: {e}",
                        message.topic(),
                        message.partition(),
                        message.offset()
                    ));
                    let _ = tx.send(Err(err)).await;
                    break;
                }
            }
        }
    }

    tracing::debug!("Consumer task exiting");
}

/// Commit past `message`. A failed commit only means a redelivery.
fn commit(consumer: &StreamConsumer, message: &BorrowedMessage<'_>) {
    if let Err(e) = consumer.commit_message(message, CommitMode::Async) {
        tracing::warn!(
            topic = message.topic(),
            partition = message.partition(),
            offset = message.offset(),
            error = %e,
            "Failed to commit offset (message may be redelivered)"
        );
    }
}
