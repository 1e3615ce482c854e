//! Mapping between [`SerializedEvent`] and Kafka records.
//!
//! | event field  | record part                 |
//! |--------------|-----------------------------|
//! | `data`       | payload, untouched          |
//! | `key`        | record key                  |
//! | `event_type` | `event-type` header         |
//! | `metadata`   | `metadata` header, JSON     |
//!
//! The payload is never wrapped, so foreign producers and consumers see the
//! plain JSON body. Inbound records without an `event-type` header take the
//! topic name as their event type.

use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use reporting_core::event::SerializedEvent;
use reporting_core::event_bus::EventBusError;

/// Header carrying [`SerializedEvent::event_type`].
pub const EVENT_TYPE_HEADER: &str = "event-type";

/// Header carrying [`SerializedEvent::metadata`] as JSON.
pub const METADATA_HEADER: &str = "metadata";

/// Build the record headers for `event`.
///
/// # Errors
///
/// Returns a serialization error if the metadata cannot be encoded.
pub fn headers_for(event: &SerializedEvent) -> Result<OwnedHeaders, serde_json::Error> {
    let mut headers = OwnedHeaders::new_with_capacity(2).insert(Header {
        key: EVENT_TYPE_HEADER,
        value: Some(event.event_type.as_str()),
    });
    if let Some(metadata) = &event.metadata {
        let encoded = serde_json::to_vec(metadata)?;
        headers = headers.insert(Header {
            key: METADATA_HEADER,
            value: Some(encoded.as_slice()),
        });
    }
    Ok(headers)
}

/// Rebuild a [`SerializedEvent`] from a consumed record.
///
/// # Errors
///
/// Returns [`EventBusError::DeserializationFailed`] if the record has no
/// payload (a tombstone).
pub fn decode<M: Message>(message: &M) -> Result<SerializedEvent, EventBusError> {
    let payload = message.payload().ok_or_else(|| {
        EventBusError::DeserializationFailed(format!(
            "Message on '{}' has no payload",
            message.topic()
        ))
    })?;

    let mut event_type = None;
    let mut metadata = None;
    if let Some(headers) = message.headers() {
        for header in headers.iter() {
            match (header.key, header.value) {
                (EVENT_TYPE_HEADER, Some(value)) => {
                    event_type = std::str::from_utf8(value).ok().map(str::to_string);
                }
                (METADATA_HEADER, Some(value)) => match serde_json::from_slice(value) {
                    Ok(parsed) => metadata = Some(parsed),
                    Err(e) => tracing::warn!(
                        topic = message.topic(),
                        error = %e,
                        "Ignoring undecodable metadata header"
                    ),
                },
                _ => {}
            }
        }
    }

    let event = SerializedEvent {
        event_type: event_type.unwrap_or_else(|| message.topic().to_string()),
        data: payload.to_vec(),
        metadata,
        key: message
            .key()
            .map(|key| String::from_utf8_lossy(key).into_owned()),
    };
    Ok(event)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rdkafka::message::{OwnedMessage, Timestamp};
    use serde_json::json;

    fn record(
        payload: Option<&[u8]>,
        key: Option<&str>,
        headers: Option<OwnedHeaders>,
    ) -> OwnedMessage {
        OwnedMessage::new(
            payload.map(<[u8]>::to_vec),
            key.map(|k| k.as_bytes().to_vec()),
            "customer-events".to_string(),
            Timestamp::NotAvailable,
            0,
            7,
            headers,
        )
    }

    #[test]
    fn headers_carry_event_type_and_metadata() {
        let event = SerializedEvent::new(
            "ReportCreated.v1".to_string(),
            br#"{"reportId":"R1"}"#.to_vec(),
            Some(json!({"source_topic": "customer-events"})),
        )
        .with_key("R1");

        let message = record(
            Some(&event.data),
            event.key.as_deref(),
            Some(headers_for(&event).unwrap()),
        );
        let decoded = decode(&message).unwrap();

        assert_eq!(decoded, event);
    }

    #[test]
    fn missing_event_type_falls_back_to_topic() {
        let message = record(Some(br#"{"customerId":"C-1"}"#), None, None);

        let decoded = decode(&message).unwrap();

        assert_eq!(decoded.event_type, "customer-events");
        assert_eq!(decoded.data, br#"{"customerId":"C-1"}"#.to_vec());
        assert!(decoded.metadata.is_none());
        assert!(decoded.key.is_none());
    }

    #[test]
    fn events_without_metadata_send_only_the_type_header() {
        let event = SerializedEvent::new("ReportDeleted.v1".to_string(), b"{}".to_vec(), None);

        let headers = headers_for(&event).unwrap();

        assert_eq!(headers.count(), 1);
        assert_eq!(headers.get(0).key, EVENT_TYPE_HEADER);
    }

    #[test]
    fn undecodable_metadata_is_ignored() {
        let headers = OwnedHeaders::new().insert(Header {
            key: METADATA_HEADER,
            value: Some("not json"),
        });
        let message = record(Some(b"{}"), None, Some(headers));

        let decoded = decode(&message).unwrap();

        assert!(decoded.metadata.is_none());
    }

    #[test]
    fn tombstone_is_rejected() {
        let message = record(None, Some("R1"), None);

        let error = decode(&message).unwrap_err();

        assert!(matches!(error, EventBusError::DeserializationFailed(ref reason) if reason.contains("customer-events")));
    }
}
