//! In-memory event bus.

use crate::call_log::{CallLog, Port, record};
use futures::channel::mpsc;
use reporting_core::event::SerializedEvent;
use reporting_core::event_bus::{
    Acknowledger, Delivery, Disposition, EventBus, EventBusError, EventStream,
};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Sender = mpsc::UnboundedSender<Result<Delivery, EventBusError>>;
type Subscriber = (Vec<String>, Sender);
type Settlements = Arc<Mutex<Vec<(String, Disposition)>>>;

/// [`EventBus`] that records publishes and fans them out to in-process
/// subscribers.
///
/// Subscription streams stay open until [`InMemoryEventBus::close_subscriptions`]
/// is called and every outstanding delivery has been acked, mirroring a broker
/// that never hangs up on its own. A nacked delivery is put back on the
/// subscriber's stream straight away.
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventBus {
    published: Arc<Mutex<Vec<(String, SerializedEvent)>>>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    settlements: Settlements,
    failing: Arc<AtomicBool>,
    failing_topics: Arc<Mutex<HashSet<String>>>,
    latency: Arc<Mutex<Option<Duration>>>,
    log: Option<CallLog>,
}

impl InMemoryEventBus {
    /// Create a new bus with no subscribers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every publish in `log`.
    #[must_use]
    pub fn with_call_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Make every publish fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make publishes to one topic fail.
    pub fn fail_topic(&self, topic: &str) {
        self.failing_topics.lock().unwrap().insert(topic.to_string());
    }

    /// Let publishes to a topic passed to [`fail_topic`](Self::fail_topic)
    /// succeed again.
    pub fn restore_topic(&self, topic: &str) {
        self.failing_topics.lock().unwrap().remove(topic);
    }

    /// Delay every publish by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Every successful publish, in order.
    #[must_use]
    pub fn published(&self) -> Vec<(String, SerializedEvent)> {
        self.published.lock().unwrap().clone()
    }

    /// Successful publishes to `topic`.
    #[must_use]
    pub fn published_to(&self, topic: &str) -> Vec<SerializedEvent> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// Successful publishes to `topic`, decoded as JSON.
    #[must_use]
    pub fn published_json(&self, topic: &str) -> Vec<serde_json::Value> {
        self.published_to(topic)
            .iter()
            .filter_map(|e| serde_json::from_slice(&e.data).ok())
            .collect()
    }

    /// Every settled delivery as `(topic, disposition)`, in settlement order.
    #[must_use]
    pub fn settlements(&self) -> Vec<(String, Disposition)> {
        self.settlements.lock().unwrap().clone()
    }

    /// How many deliveries on `topic` were settled with `disposition`.
    #[must_use]
    pub fn settled(&self, topic: &str, disposition: Disposition) -> usize {
        self.settlements
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, d)| t == topic && *d == disposition)
            .count()
    }

    /// Deliver an event to subscribers of `topic` without recording a publish.
    pub fn deliver(&self, topic: &str, event: SerializedEvent) {
        self.fan_out(topic, &event);
    }

    /// Deliver a raw body as a foreign producer would, with the topic as type.
    pub fn deliver_raw(&self, topic: &str, body: &[u8]) {
        self.deliver(
            topic,
            SerializedEvent::new(topic.to_string(), body.to_vec(), None),
        );
    }

    /// Push a stream-level error to subscribers of `topic`.
    pub fn inject_error(&self, topic: &str, error: EventBusError) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|(topics, sender)| {
            if topics.iter().any(|t| t == topic) {
                sender.unbounded_send(Err(error.clone())).is_ok()
            } else {
                !sender.is_closed()
            }
        });
    }

    /// End every open subscription stream.
    pub fn close_subscriptions(&self) {
        self.subscribers.lock().unwrap().clear();
    }

    fn fan_out(&self, topic: &str, event: &SerializedEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|(topics, sender)| {
            if topics.iter().any(|t| t == topic) {
                send_delivery(sender, &self.settlements, topic, event.clone())
            } else {
                !sender.is_closed()
            }
        });
    }
}

/// Queue `event` on `sender` with an acknowledger that records its settlement
/// and queues the event again on nack.
fn send_delivery(
    sender: &Sender,
    settlements: &Settlements,
    topic: &str,
    event: SerializedEvent,
) -> bool {
    let retry_sender = sender.clone();
    let retry_settlements = Arc::clone(settlements);
    let retry_topic = topic.to_string();
    let retry_event = event.clone();

    let ack = Acknowledger::new(move |disposition| {
        retry_settlements
            .lock()
            .unwrap()
            .push((retry_topic.clone(), disposition));
        if disposition == Disposition::Nack && !retry_sender.is_closed() {
            send_delivery(&retry_sender, &retry_settlements, &retry_topic, retry_event);
        }
    });

    sender
        .unbounded_send(Ok(Delivery::new(event, ack)))
        .is_ok()
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();
        Box::pin(async move {
            record(self.log.as_ref(), Port::Bus, "publish", &topic);
            let latency = *self.latency.lock().unwrap();
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            let topic_fails = self.failing_topics.lock().unwrap().contains(&topic);
            if self.failing.load(Ordering::SeqCst) || topic_fails {
                return Err(EventBusError::PublishFailed {
                    topic,
                    reason: "injected failure".into(),
                });
            }
            self.published
                .lock()
                .unwrap()
                .push((topic.clone(), event.clone()));
            self.fan_out(&topic, &event);
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(ToString::to_string).collect();
        Box::pin(async move {
            let (sender, receiver) = mpsc::unbounded();
            self.subscribers.lock().unwrap().push((topics, sender));
            let stream: EventStream = Box::pin(receiver);
            Ok(stream)
        })
    }
}
