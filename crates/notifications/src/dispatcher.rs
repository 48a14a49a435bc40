use std::sync::Arc;

use async_trait::async_trait;
use event_bus::{Delivery, HandlerError, MessageHandler};

use crate::{NotificationRepository, NotificationService};

/// Queue the dispatcher consumes from.
pub const NOTIFICATION_QUEUE: &str = "notification_booking_queue";

/// Binding that routes every booking event to [`NOTIFICATION_QUEUE`].
pub const NOTIFICATION_BINDING: &str = "booking.#";

/// Event consumer that notifies booking parties.
///
/// Storage failures are returned to the channel so the delivery is retried;
/// a retried event never produces a second notification.
pub struct NotificationDispatcher<R: NotificationRepository> {
    service: Arc<NotificationService<R>>,
}

impl<R: NotificationRepository> NotificationDispatcher<R> {
    pub fn new(service: Arc<NotificationService<R>>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<R: NotificationRepository + 'static> MessageHandler for NotificationDispatcher<R> {
    fn name(&self) -> &str {
        "notification-dispatcher"
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        if delivery.redelivered {
            tracing::warn!(
                event_id = %delivery.envelope.event_id,
                attempt = delivery.attempt,
                "handling redelivered booking event"
            );
        }
        self.service.handle_booking_event(&delivery.envelope).await?;
        Ok(())
    }
}
