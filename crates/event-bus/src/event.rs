use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ChannelError, Result};

/// Content type of every envelope produced by this crate.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Unique identifier for an event.
///
/// Consumers use it to recognise redeliveries. It carries no ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<EventId> for Uuid {
    fn from(id: EventId) -> Self {
        id.0
    }
}

/// An immutable event as it travels through the channel.
///
/// The `event_type` doubles as the routing key, e.g. `booking.confirmed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique identifier for this event.
    pub event_id: EventId,

    /// Dot-separated event type, used as the routing key.
    pub event_type: String,

    /// When the event was created.
    pub timestamp: DateTime<Utc>,

    /// MIME type of the payload.
    pub content_type: String,

    /// The event payload as JSON.
    pub payload: serde_json::Value,

    /// Additional metadata about the event.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelope {
    /// Creates a new event envelope builder.
    pub fn builder() -> EventEnvelopeBuilder {
        EventEnvelopeBuilder::default()
    }

    /// Routing key used when publishing to a topic exchange.
    pub fn routing_key(&self) -> &str {
        &self.event_type
    }

    /// Deserializes the payload into a concrete type.
    pub fn decode_payload<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Builder for constructing event envelopes.
#[derive(Debug, Default)]
pub struct EventEnvelopeBuilder {
    event_id: Option<EventId>,
    event_type: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
    metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelopeBuilder {
    /// Sets the event ID. If not set, a new ID will be generated.
    pub fn event_id(mut self, id: EventId) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Sets the event type.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Adds a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Builds the event envelope.
    ///
    /// Fails with [`ChannelError::IncompleteEnvelope`] when the event type or
    /// payload was never set.
    pub fn build(self) -> Result<EventEnvelope> {
        let event_type = self
            .event_type
            .filter(|t| !t.is_empty())
            .ok_or(ChannelError::IncompleteEnvelope("event_type"))?;
        let payload = self
            .payload
            .ok_or(ChannelError::IncompleteEnvelope("payload"))?;

        Ok(EventEnvelope {
            event_id: self.event_id.unwrap_or_default(),
            event_type,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            content_type: JSON_CONTENT_TYPE.to_string(),
            payload,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_new_creates_unique_ids() {
        assert_ne!(EventId::new(), EventId::new());
    }

    #[test]
    fn builder_fills_defaults() {
        let payload = serde_json::json!({"status": "pending"});

        let envelope = EventEnvelope::builder()
            .event_type("booking.created")
            .payload_raw(payload.clone())
            .metadata("source", serde_json::json!("booking-service"))
            .build()
            .unwrap();

        assert_eq!(envelope.routing_key(), "booking.created");
        assert_eq!(envelope.content_type, JSON_CONTENT_TYPE);
        assert_eq!(envelope.payload, payload);
        assert_eq!(
            envelope.metadata.get("source"),
            Some(&serde_json::json!("booking-service"))
        );
    }

    #[test]
    fn builder_rejects_missing_event_type() {
        let result = EventEnvelope::builder()
            .payload_raw(serde_json::json!({}))
            .build();
        assert!(matches!(
            result,
            Err(ChannelError::IncompleteEnvelope("event_type"))
        ));
    }

    #[test]
    fn builder_rejects_missing_payload() {
        let result = EventEnvelope::builder().event_type("booking.created").build();
        assert!(matches!(
            result,
            Err(ChannelError::IncompleteEnvelope("payload"))
        ));
    }

    #[test]
    fn decode_payload_into_struct() {
        #[derive(Deserialize)]
        struct Snapshot {
            status: String,
        }

        let envelope = EventEnvelope::builder()
            .event_type("booking.confirmed")
            .payload_raw(serde_json::json!({"status": "confirmed"}))
            .build()
            .unwrap();

        let snapshot: Snapshot = envelope.decode_payload().unwrap();
        assert_eq!(snapshot.status, "confirmed");
    }

    #[test]
    fn wire_format_keeps_field_names() {
        let envelope = EventEnvelope::builder()
            .event_type("booking.cancelled")
            .payload_raw(serde_json::json!({"id": "x"}))
            .build()
            .unwrap();

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["event_type"], "booking.cancelled");
        assert_eq!(json["content_type"], "application/json");
        assert_eq!(json["payload"]["id"], "x");
    }
}
