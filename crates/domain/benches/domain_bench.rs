use chrono::NaiveDate;
use common::{BookingId, ItemId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    AvailabilityLedger, BookingService, ConfirmBooking, CreateBooking, InMemoryAvailabilityStore,
    InMemoryBookingStore, Money, Pricing,
};

fn date(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, m, d).unwrap()
}

fn create_cmd(renter: UserId, owner: UserId) -> CreateBooking {
    CreateBooking::new(
        renter,
        owner,
        ItemId::new(),
        date(6, 1),
        date(6, 4),
        Money::from_cents(10_000),
        Money::from_cents(5_000),
    )
}

fn bench_pricing(c: &mut Criterion) {
    c.bench_function("domain/pricing", |b| {
        b.iter(|| {
            Pricing::calculate(
                date(6, 1),
                date(6, 30),
                Money::from_cents(12_345),
                Money::from_cents(5_000),
            )
            .unwrap()
        });
    });
}

fn bench_create_booking(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = BookingService::new(InMemoryBookingStore::new());

    c.bench_function("domain/create_booking", |b| {
        b.iter(|| {
            rt.block_on(async {
                service
                    .create(create_cmd(UserId::new(), UserId::new()))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_create_and_confirm(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = BookingService::new(InMemoryBookingStore::new());

    c.bench_function("domain/create_and_confirm", |b| {
        b.iter(|| {
            rt.block_on(async {
                let owner = UserId::new();
                let booking = service
                    .create(create_cmd(UserId::new(), owner))
                    .await
                    .unwrap();
                service
                    .confirm(ConfirmBooking::new(booking.id, owner))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_block_dates(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ledger = AvailabilityLedger::new(InMemoryAvailabilityStore::new());

    // A busy item: one booked week per month of the year.
    let busy = ItemId::new();
    rt.block_on(async {
        for m in 1..=12 {
            ledger
                .block_dates(busy, date(m, 1), date(m, 8), BookingId::new())
                .await
                .unwrap();
        }
    });

    let mut group = c.benchmark_group("domain/availability");

    group.bench_function("block_fresh_item", |b| {
        b.iter(|| {
            rt.block_on(async {
                ledger
                    .block_dates(ItemId::new(), date(7, 1), date(7, 5), BookingId::new())
                    .await
                    .unwrap();
            });
        });
    });

    group.bench_function("check_busy_item", |b| {
        b.iter(|| {
            rt.block_on(async {
                ledger
                    .check_conflict(busy, date(7, 3), date(7, 10), None)
                    .await
                    .unwrap()
            })
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_pricing,
    bench_create_booking,
    bench_create_and_confirm,
    bench_block_dates
);
criterion_main!(benches);
