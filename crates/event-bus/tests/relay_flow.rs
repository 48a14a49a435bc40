use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use event_bus::{
    BOOKING_EXCHANGE, Delivery, EventChannel, EventEnvelope, HandlerError, InMemoryEventChannel,
    InMemoryOutbox, MessageHandler, OutboxRecord, OutboxRelay, QueueOptions, RelayConfig,
};
use tokio::sync::Mutex;

#[derive(Default)]
struct Collector {
    routing_keys: Mutex<Vec<String>>,
}

#[async_trait]
impl MessageHandler for Collector {
    fn name(&self) -> &str {
        "collector"
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        self.routing_keys
            .lock()
            .await
            .push(delivery.envelope.routing_key().to_string());
        Ok(())
    }
}

fn record(event_type: &str) -> OutboxRecord {
    let envelope = EventEnvelope::builder()
        .event_type(event_type)
        .payload_raw(serde_json::json!({"status": "pending"}))
        .build()
        .unwrap();
    OutboxRecord::new(BOOKING_EXCHANGE, envelope)
}

#[tokio::test]
async fn outbox_events_reach_independent_consumers() {
    let channel = InMemoryEventChannel::new();
    channel.declare_exchange(BOOKING_EXCHANGE).await.unwrap();
    channel
        .declare_queue("notification_booking_queue", QueueOptions::default())
        .await
        .unwrap();
    channel
        .bind_queue("notification_booking_queue", "booking.#", BOOKING_EXCHANGE)
        .await
        .unwrap();
    channel
        .declare_queue("availability_booking_queue", QueueOptions::default())
        .await
        .unwrap();
    channel
        .bind_queue("availability_booking_queue", "booking.cancelled", BOOKING_EXCHANGE)
        .await
        .unwrap();

    let everything = Arc::new(Collector::default());
    let cancellations = Arc::new(Collector::default());
    let sub_all = channel
        .subscribe("notification_booking_queue", everything.clone())
        .await
        .unwrap();
    let sub_cancel = channel
        .subscribe("availability_booking_queue", cancellations.clone())
        .await
        .unwrap();

    let outbox = InMemoryOutbox::new();
    outbox
        .append(&[
            record("booking.created"),
            record("booking.confirmed"),
            record("booking.cancelled"),
        ])
        .await;

    let relay = OutboxRelay::new(
        Arc::new(outbox.clone()),
        Arc::new(channel.clone()),
        RelayConfig {
            poll_interval: Duration::from_millis(10),
            ..RelayConfig::default()
        },
    )
    .spawn();

    for _ in 0..200 {
        if everything.routing_keys.lock().await.len() == 3
            && cancellations.routing_keys.lock().await.len() == 1
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    relay.shutdown().await;
    sub_all.shutdown().await;
    sub_cancel.shutdown().await;

    let mut all = everything.routing_keys.lock().await.clone();
    all.sort();
    assert_eq!(
        all,
        vec!["booking.cancelled", "booking.confirmed", "booking.created"]
    );
    assert_eq!(
        *cancellations.routing_keys.lock().await,
        vec!["booking.cancelled".to_string()]
    );
    assert_eq!(outbox.unpublished_count().await, 0);
}
