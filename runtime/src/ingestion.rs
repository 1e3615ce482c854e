//! Turning foreign domain events into reports.
//!
//! Each inbound topic gets one [`IngestionHandler`], which maps an event body
//! to a [`NewReport`] with a sentinel report type and routes it through
//! [`ReportLifecycle::create`]. An [`IngestionWorker`] owns the subscription
//! loop around a handler.
//!
//! # Delivery semantics
//!
//! Delivery is at-least-once and nothing is deduplicated: a redelivered event
//! creates a second report. Events that cannot be turned into a report are
//! parked on a dead-letter topic instead of stopping the loop.
//!
//! A delivery is acked only once its event became a report or was parked.
//! When parking fails too, the worker waits `redelivery_delay` and nacks, so
//! the transport hands the same event back. An event that is in flight when
//! the worker stops is never acked and comes back after a restart.

use crate::lifecycle::ReportLifecycle;
use futures::StreamExt;
use reporting_core::error::IngestionError;
use reporting_core::event::SerializedEvent;
use reporting_core::event_bus::{Delivery, EventBusError};
use reporting_core::report::{Attributes, NewReport, Report};
use reporting_core::telemetry::IngestionOutcome;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::Instrument;

/// Default pause before an event that could not be handled or parked is
/// handed back to the transport.
pub const DEFAULT_REDELIVERY_DELAY: Duration = Duration::from_secs(1);

/// Status given to every ingested report.
pub const INGESTED_STATUS: &str = "processed";

/// Derive the sentinel report type for an inbound topic.
///
/// A trailing `-events` is dropped, dashes become underscores, the result is
/// uppercased, and `_EVENT` is appended.
///
/// ```
/// use reporting_runtime::ingestion::sentinel_report_type;
///
/// assert_eq!(sentinel_report_type("customer-events"), "CUSTOMER_EVENT");
/// assert_eq!(sentinel_report_type("order-line-events"), "ORDER_LINE_EVENT");
/// assert_eq!(sentinel_report_type("billing"), "BILLING_EVENT");
/// ```
#[must_use]
pub fn sentinel_report_type(topic: &str) -> String {
    let base = topic.strip_suffix("-events").unwrap_or(topic);
    format!("{}_EVENT", base.replace('-', "_").to_uppercase())
}

/// Maps events from one topic to reports.
#[derive(Clone)]
pub struct IngestionHandler {
    topic: String,
    report_type: String,
    lifecycle: ReportLifecycle,
}

impl IngestionHandler {
    /// Handle events from `topic`.
    #[must_use]
    pub fn new(topic: impl Into<String>, lifecycle: ReportLifecycle) -> Self {
        let topic = topic.into();
        let report_type = sentinel_report_type(&topic);
        Self {
            topic,
            report_type,
            lifecycle,
        }
    }

    /// The inbound topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The sentinel report type given to ingested reports.
    #[must_use]
    pub fn report_type(&self) -> &str {
        &self.report_type
    }

    /// Build the creation payload for an event.
    ///
    /// A JSON object body becomes the attribute bag as-is. Any other JSON
    /// value is wrapped as `{"data": value}`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestionError::Malformed`] if the body is not JSON.
    pub fn to_new_report(&self, event: &SerializedEvent) -> Result<NewReport, IngestionError> {
        let body: Value =
            serde_json::from_slice(&event.data).map_err(|e| IngestionError::Malformed {
                topic: self.topic.clone(),
                reason: e.to_string(),
            })?;

        let attributes = match body {
            Value::Object(map) => map,
            other => {
                let mut wrapped = Attributes::new();
                wrapped.insert("data".to_string(), other);
                wrapped
            }
        };

        Ok(NewReport::new(self.report_type.clone())
            .with_attributes(attributes)
            .with_status(INGESTED_STATUS))
    }

    /// Create a report from an event.
    ///
    /// # Errors
    ///
    /// - [`IngestionError::Malformed`] if the body is not JSON.
    /// - [`IngestionError::Downstream`] if the create fails.
    pub async fn handle(&self, event: &SerializedEvent) -> Result<Report, IngestionError> {
        let payload = self.to_new_report(event)?;
        self.lifecycle
            .create(payload)
            .await
            .map_err(|source| IngestionError::Downstream {
                topic: self.topic.clone(),
                source,
            })
    }
}

/// Counts of what a worker did before it stopped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestionStats {
    /// Reports created
    pub created: u64,
    /// Events parked on the dead-letter topic
    pub parked: u64,
    /// Events that failed, could not be parked, and were nacked
    pub requeued: u64,
    /// Errors yielded by the stream itself
    pub stream_errors: u64,
}

impl IngestionStats {
    fn observe(&mut self, outcome: IngestionOutcome) {
        match outcome {
            IngestionOutcome::Created => self.created += 1,
            IngestionOutcome::Parked => self.parked += 1,
            IngestionOutcome::Requeued => self.requeued += 1,
            IngestionOutcome::StreamError => self.stream_errors += 1,
        }
    }
}

/// Subscription loop around one [`IngestionHandler`].
pub struct IngestionWorker {
    handler: IngestionHandler,
    dead_letter_topic: String,
    redelivery_delay: Duration,
}

impl IngestionWorker {
    /// Worker that parks failures on `{topic}.dlq`.
    #[must_use]
    pub fn new(handler: IngestionHandler) -> Self {
        let dead_letter_topic = format!("{}.dlq", handler.topic());
        Self {
            handler,
            dead_letter_topic,
            redelivery_delay: DEFAULT_REDELIVERY_DELAY,
        }
    }

    /// Override the dead-letter topic.
    #[must_use]
    pub fn with_dead_letter_topic(mut self, topic: impl Into<String>) -> Self {
        self.dead_letter_topic = topic.into();
        self
    }

    /// The dead-letter topic.
    #[must_use]
    pub fn dead_letter_topic(&self) -> &str {
        &self.dead_letter_topic
    }

    /// Override the pause before a requeued event is nacked.
    #[must_use]
    pub const fn with_redelivery_delay(mut self, delay: Duration) -> Self {
        self.redelivery_delay = delay;
        self
    }

    /// Handle one event, parking it on failure.
    ///
    /// Returns [`IngestionOutcome::Requeued`] when parking fails as well; the
    /// caller must then hand the event back to its transport.
    pub async fn process(&self, event: SerializedEvent) -> IngestionOutcome {
        let topic = self.handler.topic();
        let span = tracing::info_span!("ingest_event", topic, event_type = %event.event_type);

        let outcome = async {
            match self.handler.handle(&event).await {
                Ok(report) => {
                    tracing::info!(report_id = %report.id, "Ingested event as report");
                    IngestionOutcome::Created
                }
                Err(error) => {
                    tracing::warn!(error = %error, "Failed to ingest event, parking it");
                    self.park(event, &error).await
                }
            }
        }
        .instrument(span)
        .await;

        self.handler
            .lifecycle
            .telemetry()
            .record_ingestion(topic, outcome);
        outcome
    }

    /// Consume the subscription until the stream ends or `shutdown` resolves.
    ///
    /// Each delivery is acked after it was turned into a report or parked,
    /// and nacked after `redelivery_delay` otherwise. Stream errors are
    /// logged and counted; they never end the loop.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError`] only if the subscription cannot be opened.
    pub async fn run<S>(self, shutdown: S) -> Result<IngestionStats, EventBusError>
    where
        S: Future<Output = ()>,
    {
        let topic = self.handler.topic().to_string();
        let mut stream = self
            .handler
            .lifecycle
            .events()
            .subscribe(&[topic.as_str()])
            .await?;
        tracing::info!(
            topic = %topic,
            report_type = %self.handler.report_type(),
            dead_letter_topic = %self.dead_letter_topic,
            "Ingestion worker started"
        );

        let mut stats = IngestionStats::default();
        tokio::pin!(shutdown);

        loop {
            let next = tokio::select! {
                () = &mut shutdown => {
                    tracing::info!(topic = %topic, "Ingestion worker shutting down");
                    break;
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(Delivery { event, ack })) => {
                    let outcome = self.process(event).await;
                    stats.observe(outcome);
                    if outcome != IngestionOutcome::Requeued {
                        ack.ack();
                        continue;
                    }

                    let stopping = tokio::select! {
                        () = tokio::time::sleep(self.redelivery_delay) => false,
                        () = &mut shutdown => true,
                    };
                    ack.nack();
                    if stopping {
                        tracing::info!(topic = %topic, "Ingestion worker shutting down");
                        break;
                    }
                }
                Some(Err(error)) => {
                    tracing::warn!(topic = %topic, error = %error, "Event stream error");
                    self.handler
                        .lifecycle
                        .telemetry()
                        .record_ingestion(&topic, IngestionOutcome::StreamError);
                    stats.observe(IngestionOutcome::StreamError);
                }
                None => {
                    tracing::info!(topic = %topic, "Event stream ended");
                    break;
                }
            }
        }

        Ok(stats)
    }

    async fn park(&self, event: SerializedEvent, error: &IngestionError) -> IngestionOutcome {
        let mut metadata = serde_json::json!({
            "source_topic": self.handler.topic(),
            "error": error.to_string(),
        });
        if let (Some(original), Some(map)) = (event.metadata, metadata.as_object_mut()) {
            map.insert("original_metadata".to_string(), original);
        }
        let parked = SerializedEvent {
            event_type: event.event_type,
            data: event.data,
            metadata: Some(metadata),
            key: event.key,
        };

        let limit = self.handler.lifecycle.config().publish_timeout;
        let published = tokio::time::timeout(
            limit,
            self.handler
                .lifecycle
                .events()
                .publish(&self.dead_letter_topic, &parked),
        )
        .await;

        match published {
            Ok(Ok(())) => IngestionOutcome::Parked,
            Ok(Err(e)) => {
                tracing::error!(
                    dead_letter_topic = %self.dead_letter_topic,
                    error = %e,
                    "Failed to park event, requeueing it"
                );
                IngestionOutcome::Requeued
            }
            Err(_) => {
                tracing::error!(
                    dead_letter_topic = %self.dead_letter_topic,
                    timeout_ms = limit.as_millis(),
                    "Timed out parking event, requeueing it"
                );
                IngestionOutcome::Requeued
            }
        }
    }
}
