use criterion::{Criterion, criterion_group, criterion_main};
use event_bus::{
    BOOKING_EXCHANGE, BindingPattern, EventChannel, EventEnvelope, InMemoryEventChannel,
    QueueOptions,
};

fn make_event(event_type: &str) -> EventEnvelope {
    EventEnvelope::builder()
        .event_type(event_type)
        .payload_raw(serde_json::json!({
            "id": "00000000-0000-0000-0000-000000000001",
            "status": "pending"
        }))
        .build()
        .unwrap()
}

fn bench_pattern_matching(c: &mut Criterion) {
    let hash = BindingPattern::parse("booking.#").unwrap();
    let middle = BindingPattern::parse("booking.#.audit").unwrap();

    c.bench_function("routing/match_trailing_hash", |b| {
        b.iter(|| hash.matches("booking.cancelled"));
    });

    c.bench_function("routing/match_inner_hash", |b| {
        b.iter(|| middle.matches("booking.created.region.eu.audit"));
    });
}

fn bench_publish_fanout(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let channel = InMemoryEventChannel::new();
    rt.block_on(async {
        channel.declare_exchange(BOOKING_EXCHANGE).await.unwrap();
        for (queue, pattern) in [("all", "booking.#"), ("cancelled", "booking.cancelled")] {
            channel
                .declare_queue(queue, QueueOptions::auto_ack())
                .await
                .unwrap();
            channel
                .bind_queue(queue, pattern, BOOKING_EXCHANGE)
                .await
                .unwrap();
        }
    });
    let event = make_event("booking.cancelled");

    c.bench_function("channel/publish_two_queues", |b| {
        b.iter(|| {
            rt.block_on(async {
                channel.publish(BOOKING_EXCHANGE, &event).await.unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_pattern_matching, bench_publish_fanout);
criterion_main!(benches);
