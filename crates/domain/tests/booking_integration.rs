//! Integration tests for the booking lifecycle and the availability ledger.
//!
//! These tests drive the public service APIs over the in-memory stores and
//! check the persisted state and the outbox events each step leaves behind.

use chrono::NaiveDate;
use common::{ItemId, PageRequest, UserId};
use domain::{
    ActivateBooking, AvailabilityError, AvailabilityLedger, BookingError, BookingService,
    BookingStatus, BookingUpdate, CancelBooking, CompleteBooking, ConfirmBooking, CreateBooking,
    DomainError, InMemoryAvailabilityStore, InMemoryBookingStore, Money, PaymentStatus,
    RecordPayment, SlotStatus, UpdateBooking,
};
use event_bus::Outbox;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn create_service() -> BookingService<InMemoryBookingStore> {
    BookingService::new(InMemoryBookingStore::new())
}

fn june_booking(renter: UserId, owner: UserId) -> CreateBooking {
    CreateBooking::new(
        renter,
        owner,
        ItemId::new(),
        date(2025, 6, 1),
        date(2025, 6, 4),
        Money::from_cents(10_000),
        Money::from_cents(5_000),
    )
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn full_rental_lifecycle() {
        let service = create_service();
        let renter = UserId::new();
        let owner = UserId::new();

        let booking = service.create(june_booking(renter, owner)).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.total_days, 3);
        assert_eq!(booking.subtotal, Money::from_cents(30_000));
        assert_eq!(booking.service_fee, Money::from_cents(3_000));
        assert_eq!(booking.total_amount, Money::from_cents(38_000));

        service
            .confirm(ConfirmBooking::new(booking.id, owner))
            .await
            .unwrap();
        service
            .record_payment(RecordPayment::new(booking.id, "pay_42", PaymentStatus::Completed))
            .await
            .unwrap();
        service
            .update(UpdateBooking::new(
                booking.id,
                renter,
                BookingUpdate {
                    pickup_address: Some("12 Harbour Road".to_string()),
                    agreement_signed: Some(true),
                    agreement_url: Some("https://agreements.example/42".to_string()),
                    ..Default::default()
                },
            ))
            .await
            .unwrap();
        service
            .activate(ActivateBooking::new(booking.id, owner))
            .await
            .unwrap();
        let completed = service
            .complete(CompleteBooking::new(booking.id, owner))
            .await
            .unwrap();

        assert_eq!(completed.status, BookingStatus::Completed);
        assert_eq!(completed.pickup_address.as_deref(), Some("12 Harbour Road"));

        let event_types: Vec<_> = service
            .repository()
            .outbox_records()
            .await
            .into_iter()
            .map(|r| r.envelope.event_type)
            .collect();
        assert_eq!(
            event_types,
            vec![
                "booking.created",
                "booking.confirmed",
                "booking.activated",
                "booking.completed"
            ]
        );
    }

    #[tokio::test]
    async fn activation_requires_agreement_and_payment() {
        let service = create_service();
        let owner = UserId::new();
        let booking = service
            .create(june_booking(UserId::new(), owner))
            .await
            .unwrap();
        service
            .confirm(ConfirmBooking::new(booking.id, owner))
            .await
            .unwrap();

        let result = service.activate(ActivateBooking::new(booking.id, owner)).await;
        assert!(matches!(
            result,
            Err(DomainError::Booking(BookingError::AgreementNotSigned))
        ));

        service
            .update(UpdateBooking::new(
                booking.id,
                owner,
                BookingUpdate {
                    agreement_signed: Some(true),
                    ..Default::default()
                },
            ))
            .await
            .unwrap();
        let result = service.activate(ActivateBooking::new(booking.id, owner)).await;
        assert!(matches!(
            result,
            Err(DomainError::Booking(BookingError::PaymentNotCompleted))
        ));
    }

    #[tokio::test]
    async fn cancellation_records_actor_and_reason() {
        let service = create_service();
        let renter = UserId::new();
        let booking = service
            .create(june_booking(renter, UserId::new()))
            .await
            .unwrap();

        let cancelled = service
            .cancel(CancelBooking::new(booking.id, renter, "plans changed"))
            .await
            .unwrap();

        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.cancelled_by, Some(renter));
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("plans changed"));

        let records = service.repository().outbox_records().await;
        let last = records.last().unwrap();
        assert_eq!(last.envelope.event_type, "booking.cancelled");
        assert_eq!(last.envelope.payload["status"], "cancelled");
    }
}

mod transitions {
    use super::*;

    #[tokio::test]
    async fn confirm_twice_is_invalid_status() {
        let service = create_service();
        let owner = UserId::new();
        let booking = service
            .create(june_booking(UserId::new(), owner))
            .await
            .unwrap();
        service
            .confirm(ConfirmBooking::new(booking.id, owner))
            .await
            .unwrap();

        let result = service.confirm(ConfirmBooking::new(booking.id, owner)).await;
        assert!(matches!(
            result,
            Err(DomainError::Booking(BookingError::InvalidStatus {
                current: BookingStatus::Confirmed,
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn confirm_after_cancel_is_invalid_status() {
        let service = create_service();
        let owner = UserId::new();
        let booking = service
            .create(june_booking(UserId::new(), owner))
            .await
            .unwrap();
        service
            .cancel(CancelBooking::new(booking.id, owner, "unavailable"))
            .await
            .unwrap();

        let result = service.confirm(ConfirmBooking::new(booking.id, owner)).await;
        assert!(matches!(
            result,
            Err(DomainError::Booking(BookingError::InvalidStatus { .. }))
        ));
    }

    #[tokio::test]
    async fn cancel_twice_is_already_cancelled() {
        let service = create_service();
        let renter = UserId::new();
        let booking = service
            .create(june_booking(renter, UserId::new()))
            .await
            .unwrap();
        service
            .cancel(CancelBooking::new(booking.id, renter, "first"))
            .await
            .unwrap();

        let result = service
            .cancel(CancelBooking::new(booking.id, renter, "second"))
            .await;
        assert!(matches!(
            result,
            Err(DomainError::Booking(BookingError::AlreadyCancelled))
        ));
    }

    #[tokio::test]
    async fn stranger_cannot_cancel_or_confirm() {
        let service = create_service();
        let booking = service
            .create(june_booking(UserId::new(), UserId::new()))
            .await
            .unwrap();
        let stranger = UserId::new();

        assert!(matches!(
            service
                .cancel(CancelBooking::new(booking.id, stranger, "nope"))
                .await,
            Err(DomainError::Booking(BookingError::Unauthorized { .. }))
        ));
        assert!(matches!(
            service.confirm(ConfirmBooking::new(booking.id, stranger)).await,
            Err(DomainError::Booking(BookingError::Unauthorized { .. }))
        ));
    }

    #[tokio::test]
    async fn reversed_dates_are_rejected_before_storage() {
        let service = create_service();
        let mut cmd = june_booking(UserId::new(), UserId::new());
        cmd.start_date = date(2025, 6, 10);
        cmd.end_date = date(2025, 6, 1);

        assert!(matches!(
            service.create(cmd).await,
            Err(DomainError::Booking(BookingError::InvalidDates { .. }))
        ));
        assert_eq!(service.repository().booking_count().await, 0);
        assert!(service.repository().outbox_records().await.is_empty());
    }
}

mod queries {
    use super::*;

    #[tokio::test]
    async fn reads_are_idempotent() {
        let service = create_service();
        let booking = service
            .create(june_booking(UserId::new(), UserId::new()))
            .await
            .unwrap();

        let first = service.get(booking.id).await.unwrap();
        let second = service.get(booking.id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(service.repository().outbox_records().await.len(), 1);
    }

    #[tokio::test]
    async fn renter_listing_pages_newest_first() {
        let service = create_service();
        let renter = UserId::new();
        let mut ids = Vec::new();
        for _ in 0..5 {
            let booking = service
                .create(june_booking(renter, UserId::new()))
                .await
                .unwrap();
            ids.push(booking.id);
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let page = service
            .list_by_renter(renter, PageRequest::new(Some(2), Some(2)))
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id, ids[2]);
        assert_eq!(page.items[1].id, ids[1]);

        let beyond = service
            .list_by_renter(renter, PageRequest::new(Some(9), Some(2)))
            .await
            .unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total, 5);
    }
}

mod outbox {
    use super::*;

    #[tokio::test]
    async fn published_records_leave_the_pending_set() {
        let service = create_service();
        let owner = UserId::new();
        let booking = service
            .create(june_booking(UserId::new(), owner))
            .await
            .unwrap();
        service
            .confirm(ConfirmBooking::new(booking.id, owner))
            .await
            .unwrap();

        let store = service.repository();
        let pending = store.fetch_pending(10, 5).await.unwrap();
        assert_eq!(pending.len(), 2);

        store.mark_failed(pending[1].event_id(), "broker down").await.unwrap();
        store.mark_published(&[pending[0].event_id()]).await.unwrap();

        let pending = store.fetch_pending(10, 5).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].envelope.event_type, "booking.confirmed");
    }
}

mod availability {
    use super::*;

    #[tokio::test]
    async fn conflict_rejection_scenario() {
        let ledger = AvailabilityLedger::new(InMemoryAvailabilityStore::new());
        let item = ItemId::new();
        let booking = domain::Booking::create(
            &CreateBooking::new(
                UserId::new(),
                UserId::new(),
                item,
                date(2025, 7, 1),
                date(2025, 7, 5),
                Money::from_cents(1_000),
                Money::zero(),
            ),
            chrono::Utc::now(),
        )
        .unwrap()
        .0;

        ledger
            .block_dates(item, date(2025, 7, 1), date(2025, 7, 5), booking.id)
            .await
            .unwrap();

        let overlapping = ledger
            .block_dates(item, date(2025, 7, 3), date(2025, 7, 6), common::BookingId::new())
            .await;
        assert!(matches!(
            overlapping,
            Err(AvailabilityError::DateConflict { .. })
        ));

        let adjacent = ledger
            .block_dates(item, date(2025, 7, 5), date(2025, 7, 8), common::BookingId::new())
            .await
            .unwrap();
        assert_eq!(adjacent.status, SlotStatus::Booked);

        let released = ledger.release_by_booking(booking.id).await.unwrap();
        assert_eq!(released.len(), 1);
        assert!(!ledger
            .check_conflict(item, date(2025, 7, 3), date(2025, 7, 4), None)
            .await
            .unwrap());
    }
}
