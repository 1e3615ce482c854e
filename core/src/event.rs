//! Domain events announced after a committed mutation, and their wire envelope.
//!
//! Events are JSON on the wire. Downstream consumers of the report topics are
//! not necessarily Rust services, and inbound events carry schema-less bodies.
//!
//! # Example
//!
//! ```
//! use reporting_core::event::{Event, ReportAction, ReportEvent, SerializedEvent};
//! use reporting_core::report::ReportId;
//! use chrono::Utc;
//!
//! let event = ReportEvent::new(ReportAction::Created, ReportId::new("R1"), Utc::now());
//! let serialized = SerializedEvent::from_event(&event, None).unwrap();
//!
//! assert_eq!(serialized.event_type, "ReportCreated.v1");
//! assert_eq!(serialized.key.as_deref(), Some("R1"));
//! ```

use crate::report::ReportId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;
use thiserror::Error;

/// Error types for event encoding.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),
}

/// An event that can be put on the bus.
///
/// # Event Naming Convention
///
/// `event_type()` returns a stable identifier with a version suffix, for
/// example `"ReportCreated.v1"`. Consumers route on it, so it must not change
/// once published.
pub trait Event: Send + Sync + 'static {
    /// Returns the versioned event type identifier.
    fn event_type(&self) -> &'static str;

    /// Partition key for the event, if ordering per entity matters.
    fn key(&self) -> Option<String> {
        None
    }

    /// Serialize this event to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize,
    {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Deserialize an event from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if the bytes are not valid
    /// JSON for this event type.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        serde_json::from_slice(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// The wire envelope exchanged with the [`EventBus`](crate::event_bus::EventBus).
#[derive(Clone, Debug, PartialEq)]
pub struct SerializedEvent {
    /// The event type identifier (e.g., "ReportCreated.v1").
    ///
    /// Inbound events from foreign producers may not carry one; adapters then
    /// fall back to the topic name.
    pub event_type: String,

    /// The raw body, JSON for every event this workspace produces.
    pub data: Vec<u8>,

    /// Optional transport metadata.
    ///
    /// Dead-lettered events carry `source_topic` and `error` here.
    pub metadata: Option<serde_json::Value>,

    /// Optional partition key.
    pub key: Option<String>,
}

impl SerializedEvent {
    /// Create a new serialized event without a key.
    #[must_use]
    pub const fn new(
        event_type: String,
        data: Vec<u8>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_type,
            data,
            metadata,
            key: None,
        }
    }

    /// Attach a partition key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Create a serialized event from an [`Event`].
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    pub fn from_event<E: Event + Serialize>(
        event: &E,
        metadata: Option<serde_json::Value>,
    ) -> Result<Self, EventError> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            data: event.to_bytes()?,
            metadata,
            key: event.key(),
        })
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SerializedEvent {{ type: {}, size: {} bytes }}",
            self.event_type,
            self.data.len()
        )
    }
}

/// Which mutation a [`ReportEvent`] announces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportAction {
    /// A report was inserted
    Created,
    /// A report was modified
    Updated,
    /// A report was removed
    Deleted,
}

impl ReportAction {
    /// Lowercase action name as it appears in the payload.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ReportAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification that a report mutation was committed to the primary store.
///
/// Serialized as `{ "action": ..., "reportId": ..., "occurredAt": ... }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEvent {
    /// The mutation kind
    pub action: ReportAction,
    /// The affected report
    pub report_id: ReportId,
    /// When the lifecycle manager observed the commit
    pub occurred_at: DateTime<Utc>,
}

impl ReportEvent {
    /// Build an event.
    #[must_use]
    pub const fn new(action: ReportAction, report_id: ReportId, occurred_at: DateTime<Utc>) -> Self {
        Self {
            action,
            report_id,
            occurred_at,
        }
    }
}

impl Event for ReportEvent {
    fn event_type(&self) -> &'static str {
        match self.action {
            ReportAction::Created => "ReportCreated.v1",
            ReportAction::Updated => "ReportUpdated.v1",
            ReportAction::Deleted => "ReportDeleted.v1",
        }
    }

    fn key(&self) -> Option<String> {
        Some(self.report_id.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn report_event_payload_shape() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let event = ReportEvent::new(ReportAction::Deleted, ReportId::new("R9"), at);

        let value: serde_json::Value = serde_json::from_slice(&event.to_bytes().unwrap()).unwrap();
        assert_eq!(value["action"], "deleted");
        assert_eq!(value["reportId"], "R9");
        assert_eq!(value["occurredAt"], "2024-01-01T12:00:00Z");
    }

    #[test]
    fn event_type_tracks_action() {
        let at = Utc::now();
        let id = ReportId::new("R1");
        let types: Vec<_> = [ReportAction::Created, ReportAction::Updated, ReportAction::Deleted]
            .into_iter()
            .map(|action| ReportEvent::new(action, id.clone(), at).event_type())
            .collect();
        assert_eq!(types, ["ReportCreated.v1", "ReportUpdated.v1", "ReportDeleted.v1"]);
    }

    #[test]
    fn from_bytes_rejects_garbage() {
        let err = ReportEvent::from_bytes(b"not json").unwrap_err();
        assert!(matches!(err, EventError::DeserializationError(_)));
    }

    #[test]
    fn serialized_event_display() {
        let serialized =
            SerializedEvent::new("ReportCreated.v1".to_string(), vec![1, 2, 3, 4, 5], None);

        let display = format!("{serialized}");
        assert!(display.contains("ReportCreated.v1"));
        assert!(display.contains("5 bytes"));
    }
}
