//! Publish/subscribe port.
//!
//! Outbound, the lifecycle manager announces committed mutations on the
//! report topics. Inbound, the ingestion worker subscribes to foreign domain
//! topics and turns their events into reports.
//!
//! ```text
//! ┌─────────────────┐        ┌──────────────────┐
//! │ ReportLifecycle │──pub──►│ report-created   │
//! └─────────────────┘        │ report-updated   │
//!          ▲                 │ report-deleted   │
//!          │ create          └──────────────────┘
//! ┌─────────────────┐        ┌──────────────────┐
//! │ IngestionWorker │◄──sub──│ customer-events  │
//! └─────────────────┘        └──────────────────┘
//! ```
//!
//! # Delivery
//!
//! - Outbound publishes are fire-and-forget from the caller's point of view:
//!   the primary write has already committed and nothing is retried here.
//! - Inbound delivery is at-least-once. Every event arrives as a
//!   [`Delivery`] whose [`Acknowledger`] must be settled: `ack` lets the
//!   transport forget the event, `nack` (or dropping the acknowledger) hands
//!   it back for redelivery. Subscribers may see duplicates.
//!
//! # Implementations
//!
//! - `InMemoryEventBus` in `reporting-testing`
//! - `RedpandaEventBus` in `reporting-redpanda`

use crate::event::SerializedEvent;
use futures::Stream;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the broker
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an event to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// A received message could not be turned into an event
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Consumer group error
    #[error("Consumer group error: {0}")]
    ConsumerGroupError(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// How a subscriber settled a [`Delivery`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Handled; the transport may commit past it
    Ack,
    /// Not handled; the transport must deliver it again
    Nack,
}

type Settle = Box<dyn FnOnce(Disposition) + Send>;

/// Settles one inbound event with its transport.
///
/// Settling consumes the acknowledger. One that is dropped unsettled nacks,
/// so an event abandoned by a cancelled or crashed subscriber is redelivered.
#[must_use = "an unsettled delivery is redelivered"]
pub struct Acknowledger {
    settle: Option<Settle>,
}

impl Acknowledger {
    /// Acknowledger that calls `settle` exactly once.
    pub fn new(settle: impl FnOnce(Disposition) + Send + 'static) -> Self {
        Self {
            settle: Some(Box::new(settle)),
        }
    }

    /// Acknowledger for transports with nothing to commit.
    pub const fn detached() -> Self {
        Self { settle: None }
    }

    /// The event was handled.
    pub fn ack(mut self) {
        self.finish(Disposition::Ack);
    }

    /// The event was not handled and must come back.
    pub fn nack(mut self) {
        self.finish(Disposition::Nack);
    }

    /// Settle with an explicit disposition.
    pub fn settle(mut self, disposition: Disposition) {
        self.finish(disposition);
    }

    fn finish(&mut self, disposition: Disposition) {
        if let Some(settle) = self.settle.take() {
            settle(disposition);
        }
    }
}

impl Drop for Acknowledger {
    fn drop(&mut self) {
        self.finish(Disposition::Nack);
    }
}

impl fmt::Debug for Acknowledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acknowledger")
            .field("settled", &self.settle.is_none())
            .finish()
    }
}

/// One inbound event and the handle that settles it.
#[derive(Debug)]
pub struct Delivery {
    /// The event
    pub event: SerializedEvent,
    /// Settles the event with the transport
    pub ack: Acknowledger,
}

impl Delivery {
    /// Pair an event with its acknowledger.
    pub const fn new(event: SerializedEvent, ack: Acknowledger) -> Self {
        Self { event, ack }
    }
}

/// Stream of deliveries from a subscription.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Delivery, EventBusError>> + Send>>;

/// Publish/subscribe port.
///
/// Methods return boxed futures so the bus can be held as `Arc<dyn EventBus>`.
pub trait EventBus: Send + Sync {
    /// Publish an event to a topic.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the broker rejects or drops
    /// the message.
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to one or more topics.
    ///
    /// The returned stream yields every event from the listed topics as a
    /// [`Delivery`]. The transport does not move past an event until its
    /// acknowledger is settled with [`Disposition::Ack`]. Errors inside the
    /// stream are per-message and do not end it.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if the subscription
    /// cannot be established.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording() -> (Acknowledger, Arc<Mutex<Vec<Disposition>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let ack = Acknowledger::new(move |d| sink.lock().unwrap().push(d));
        (ack, seen)
    }

    #[test]
    fn ack_settles_once() {
        let (ack, seen) = recording();
        ack.ack();
        assert_eq!(*seen.lock().unwrap(), vec![Disposition::Ack]);
    }

    #[test]
    fn dropping_unsettled_acknowledger_nacks() {
        let (ack, seen) = recording();
        drop(ack);
        assert_eq!(*seen.lock().unwrap(), vec![Disposition::Nack]);
    }

    #[test]
    fn detached_acknowledger_is_inert() {
        Acknowledger::detached().nack();
        Acknowledger::detached().ack();
    }
}
