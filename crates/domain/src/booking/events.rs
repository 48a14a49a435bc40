//! Booking lifecycle events.

use event_bus::{BOOKING_EXCHANGE, ChannelError, EventEnvelope, OutboxRecord};
use serde::{Deserialize, Serialize};

use super::Booking;

/// Which transition produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingEventKind {
    Created,
    Confirmed,
    Cancelled,
    Activated,
    Completed,
}

impl BookingEventKind {
    /// Routing key on the booking exchange.
    pub fn routing_key(&self) -> &'static str {
        match self {
            BookingEventKind::Created => "booking.created",
            BookingEventKind::Confirmed => "booking.confirmed",
            BookingEventKind::Cancelled => "booking.cancelled",
            BookingEventKind::Activated => "booking.activated",
            BookingEventKind::Completed => "booking.completed",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingEventKind::Created => "created",
            BookingEventKind::Confirmed => "confirmed",
            BookingEventKind::Cancelled => "cancelled",
            BookingEventKind::Activated => "activated",
            BookingEventKind::Completed => "completed",
        }
    }
}

/// A booking transition together with the booking as it was right after it.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingEvent {
    pub kind: BookingEventKind,
    pub booking: Booking,
}

impl BookingEvent {
    pub fn new(kind: BookingEventKind, booking: &Booking) -> Self {
        Self {
            kind,
            booking: booking.clone(),
        }
    }

    /// Wraps the booking snapshot in an envelope routed by the event kind.
    pub fn to_envelope(&self) -> Result<EventEnvelope, ChannelError> {
        EventEnvelope::builder()
            .event_type(self.kind.routing_key())
            .timestamp(self.booking.updated_at)
            .payload(&self.booking)?
            .metadata("booking_id", serde_json::json!(self.booking.id))
            .metadata("booking_number", serde_json::json!(self.booking.booking_number))
            .build()
    }

    /// Builds the outbox record that publishes this event to the booking exchange.
    pub fn to_outbox_record(&self) -> Result<OutboxRecord, ChannelError> {
        Ok(OutboxRecord::new(BOOKING_EXCHANGE, self.to_envelope()?))
    }
}
