//! Event plumbing: exchange, queues, listeners and the outbox relay.

use std::sync::Arc;

use event_bus::{
    BOOKING_EXCHANGE, EventChannel, OutboxRelay, QueueOptions, RelayHandle, Subscription,
};
use notifications::{NOTIFICATION_BINDING, NOTIFICATION_QUEUE, NotificationDispatcher};
use reservation::{AVAILABILITY_BINDING, AVAILABILITY_QUEUE, AvailabilityReconciler};

use crate::config::Config;
use crate::state::{AppState, Backend};

/// Running background consumers.
pub struct Consumers {
    relay: RelayHandle,
    subscriptions: Vec<Subscription>,
}

impl Consumers {
    /// Stops the relay after a final flush, then the queue listeners.
    pub async fn shutdown(self) {
        self.relay.shutdown().await;
        for subscription in self.subscriptions {
            subscription.shutdown().await;
        }
        tracing::info!("consumers stopped");
    }
}

/// Declares the booking topology on `channel`, subscribes the notification
/// dispatcher and availability reconciler, and starts the outbox relay.
pub async fn start<B: Backend>(
    state: &AppState<B>,
    channel: Arc<dyn EventChannel>,
    config: &Config,
) -> event_bus::Result<Consumers> {
    channel.declare_exchange(BOOKING_EXCHANGE).await?;

    let options = QueueOptions::manual_ack(config.event_max_redeliveries);
    for (queue, pattern) in [
        (NOTIFICATION_QUEUE, NOTIFICATION_BINDING),
        (AVAILABILITY_QUEUE, AVAILABILITY_BINDING),
    ] {
        channel.declare_queue(queue, options).await?;
        channel.bind_queue(queue, pattern, BOOKING_EXCHANGE).await?;
    }

    let subscriptions = vec![
        channel
            .subscribe(
                NOTIFICATION_QUEUE,
                Arc::new(NotificationDispatcher::new(state.notifications.clone())),
            )
            .await?,
        channel
            .subscribe(
                AVAILABILITY_QUEUE,
                Arc::new(AvailabilityReconciler::new(state.ledger.clone())),
            )
            .await?,
    ];

    let relay = OutboxRelay::new(Arc::new(state.outbox()), channel, config.relay_config()).spawn();
    tracing::info!(exchange = BOOKING_EXCHANGE, "consumers started");

    Ok(Consumers {
        relay,
        subscriptions,
    })
}
