use std::sync::Arc;

use async_trait::async_trait;
use common::BookingId;
use domain::{AvailabilityLedger, AvailabilityRepository, BookingEventKind};
use event_bus::{Delivery, HandlerError, MessageHandler};
use serde::Deserialize;

/// Queue the reconciler consumes from.
pub const AVAILABILITY_QUEUE: &str = "availability_booking_queue";

/// Binding that routes cancellations to [`AVAILABILITY_QUEUE`].
pub const AVAILABILITY_BINDING: &str = "booking.cancelled";

#[derive(Debug, Deserialize)]
struct CancelledBooking {
    id: BookingId,
}

/// Releases a booking's slots when its cancellation event arrives.
///
/// Releasing is idempotent, so redeliveries and cancellations the
/// coordinator already handled are harmless. Other event types are ignored.
pub struct AvailabilityReconciler<A: AvailabilityRepository> {
    ledger: Arc<AvailabilityLedger<A>>,
}

impl<A: AvailabilityRepository> AvailabilityReconciler<A> {
    pub fn new(ledger: Arc<AvailabilityLedger<A>>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl<A: AvailabilityRepository + 'static> MessageHandler for AvailabilityReconciler<A> {
    fn name(&self) -> &str {
        "availability-reconciler"
    }

    #[tracing::instrument(skip(self, delivery), fields(event_id = %delivery.envelope.event_id, attempt = delivery.attempt))]
    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        if delivery.envelope.event_type != BookingEventKind::Cancelled.routing_key() {
            tracing::debug!(event_type = %delivery.envelope.event_type, "ignoring event");
            return Ok(());
        }

        let booking: CancelledBooking = delivery.envelope.decode_payload()?;
        let released = self.ledger.release_by_booking(booking.id).await?;

        metrics::counter!("availability_reconciled_total").increment(released.len() as u64);
        tracing::info!(
            booking_id = %booking.id,
            released = released.len(),
            "reconciled cancelled booking"
        );
        Ok(())
    }
}
