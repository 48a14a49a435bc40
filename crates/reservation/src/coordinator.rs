//! Reservation coordinator: dates first, booking second.

use std::sync::Arc;

use domain::{
    AvailabilityLedger, AvailabilityRepository, Booking, BookingRepository, BookingService,
    CancelBooking, CreateBooking, Pricing,
};

use crate::ReservationError;

/// Creates and cancels bookings together with their availability slots.
///
/// ```text
/// reserve:  validate ──► block dates ──► create booking
///                             ▲               │ fails
///                             └── release ◄───┘
///
/// cancel:   cancel booking ──► release slots (failure left to the reconciler)
/// ```
pub struct ReservationCoordinator<B, A>
where
    B: BookingRepository,
    A: AvailabilityRepository,
{
    bookings: Arc<BookingService<B>>,
    ledger: Arc<AvailabilityLedger<A>>,
}

impl<B, A> ReservationCoordinator<B, A>
where
    B: BookingRepository,
    A: AvailabilityRepository,
{
    pub fn new(bookings: Arc<BookingService<B>>, ledger: Arc<AvailabilityLedger<A>>) -> Self {
        Self { bookings, ledger }
    }

    pub fn bookings(&self) -> &BookingService<B> {
        &self.bookings
    }

    pub fn ledger(&self) -> &AvailabilityLedger<A> {
        &self.ledger
    }

    /// Reserves the dates and creates a pending booking for them.
    ///
    /// Nothing is left behind on failure: a conflict creates no booking, and
    /// a booking that cannot be stored gives its dates back.
    #[tracing::instrument(skip(self), fields(booking_id = %cmd.booking_id, item_id = %cmd.rental_item_id))]
    pub async fn reserve(&self, cmd: CreateBooking) -> Result<Booking, ReservationError> {
        let started = std::time::Instant::now();

        // Reject bad input before touching the ledger.
        Pricing::calculate(
            cmd.start_date,
            cmd.end_date,
            cmd.daily_rate,
            cmd.security_deposit,
        )
        .map_err(domain::DomainError::from)?;

        let slot = self
            .ledger
            .block_dates(
                cmd.rental_item_id,
                cmd.start_date,
                cmd.end_date,
                cmd.booking_id,
            )
            .await?;

        let booking_id = cmd.booking_id;
        let booking = match self.bookings.create(cmd).await {
            Ok(booking) => booking,
            Err(cause) => {
                tracing::warn!(slot_id = %slot.id, error = %cause, "booking failed, releasing dates");
                metrics::counter!("reservation_compensations_total").increment(1);
                return match self.ledger.release(slot.id).await {
                    Ok(_) => Err(cause.into()),
                    Err(release) => {
                        tracing::error!(
                            slot_id = %slot.id,
                            error = %release,
                            "compensation failed, slot left blocked"
                        );
                        Err(ReservationError::CompensationFailed {
                            booking_id,
                            cause,
                            release,
                        })
                    }
                };
            }
        };

        metrics::histogram!("reservation_duration_seconds").record(started.elapsed().as_secs_f64());
        Ok(booking)
    }

    /// Cancels the booking and gives its dates back.
    ///
    /// The cancellation stands even if releasing fails; the
    /// `booking.cancelled` event lets the reconciler finish the release.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, cmd: CancelBooking) -> Result<Booking, ReservationError> {
        let booking = self.bookings.cancel(cmd).await?;

        if let Err(e) = self.ledger.release_by_booking(booking.id).await {
            tracing::warn!(
                booking_id = %booking.id,
                error = %e,
                "release after cancel failed, deferring to reconciler"
            );
        }

        Ok(booking)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use common::{BookingId, ItemId, Page, PageRequest, SlotId, UserId};
    use domain::{
        AvailabilityError, AvailabilitySlot, BookingError, BookingStatus, DateRange, DomainError,
        InMemoryAvailabilityStore, InMemoryBookingStore, Money, StoreError,
    };
    use event_bus::OutboxRecord;

    use super::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn cmd(item: ItemId, start: NaiveDate, end: NaiveDate) -> CreateBooking {
        CreateBooking::new(
            UserId::new(),
            UserId::new(),
            item,
            start,
            end,
            Money::from_cents(10_000),
            Money::from_cents(5_000),
        )
    }

    fn coordinator<B: BookingRepository, A: AvailabilityRepository>(
        bookings: B,
        slots: A,
    ) -> ReservationCoordinator<B, A> {
        ReservationCoordinator::new(
            Arc::new(BookingService::new(bookings)),
            Arc::new(AvailabilityLedger::new(slots)),
        )
    }

    /// Booking store whose inserts always fail.
    struct FailingBookings;

    #[async_trait]
    impl BookingRepository for FailingBookings {
        async fn insert(&self, _: &Booking, _: &[OutboxRecord]) -> Result<(), StoreError> {
            Err(StoreError::Corrupt("disk full".into()))
        }

        async fn update(&self, _: &Booking, _: i64, _: &[OutboxRecord]) -> Result<(), StoreError> {
            Err(StoreError::Corrupt("disk full".into()))
        }

        async fn find_by_id(&self, _: BookingId) -> Result<Option<Booking>, StoreError> {
            Ok(None)
        }

        async fn list_by_renter(&self, _: UserId, _: PageRequest) -> Result<Page<Booking>, StoreError> {
            Ok(Page::empty())
        }

        async fn list_by_owner(&self, _: UserId, _: PageRequest) -> Result<Page<Booking>, StoreError> {
            Ok(Page::empty())
        }
    }

    /// Slot store that can claim dates but never release them.
    #[derive(Default)]
    struct StuckSlots {
        inner: InMemoryAvailabilityStore,
    }

    #[async_trait]
    impl AvailabilityRepository for StuckSlots {
        async fn find_conflicts(
            &self,
            item_id: ItemId,
            range: DateRange,
            exclude: Option<SlotId>,
        ) -> Result<Vec<AvailabilitySlot>, AvailabilityError> {
            self.inner.find_conflicts(item_id, range, exclude).await
        }

        async fn insert(&self, slot: &AvailabilitySlot) -> Result<(), AvailabilityError> {
            self.inner.insert(slot).await
        }

        async fn find_by_id(&self, id: SlotId) -> Result<Option<AvailabilitySlot>, AvailabilityError> {
            self.inner.find_by_id(id).await
        }

        async fn release(&self, _: SlotId) -> Result<AvailabilitySlot, AvailabilityError> {
            Err(StoreError::Corrupt("connection lost".into()).into())
        }

        async fn release_by_booking(
            &self,
            _: BookingId,
        ) -> Result<Vec<AvailabilitySlot>, AvailabilityError> {
            Err(StoreError::Corrupt("connection lost".into()).into())
        }

        async fn list_for_item(
            &self,
            item_id: ItemId,
            range: DateRange,
        ) -> Result<Vec<AvailabilitySlot>, AvailabilityError> {
            self.inner.list_for_item(item_id, range).await
        }
    }

    #[tokio::test]
    async fn reserve_blocks_dates_and_creates_booking() {
        let coordinator = coordinator(InMemoryBookingStore::new(), InMemoryAvailabilityStore::new());
        let item = ItemId::new();

        let booking = coordinator.reserve(cmd(item, date(7, 1), date(7, 5))).await.unwrap();

        assert_eq!(booking.status, BookingStatus::Pending);
        let slots = coordinator
            .ledger()
            .list_slots(item, date(7, 1), date(7, 5))
            .await
            .unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].booking_id, Some(booking.id));
    }

    #[tokio::test]
    async fn conflict_creates_no_booking() {
        let bookings = InMemoryBookingStore::new();
        let coordinator = coordinator(bookings.clone(), InMemoryAvailabilityStore::new());
        let item = ItemId::new();
        coordinator.reserve(cmd(item, date(7, 1), date(7, 5))).await.unwrap();

        let result = coordinator.reserve(cmd(item, date(7, 3), date(7, 6))).await;

        assert!(matches!(
            result,
            Err(ReservationError::Availability(AvailabilityError::DateConflict { .. }))
        ));
        assert_eq!(bookings.booking_count().await, 1);
    }

    #[tokio::test]
    async fn invalid_amount_never_reaches_the_ledger() {
        let slots = InMemoryAvailabilityStore::new();
        let coordinator = coordinator(InMemoryBookingStore::new(), slots.clone());
        let mut request = cmd(ItemId::new(), date(7, 1), date(7, 5));
        request.daily_rate = Money::from_cents(-1);

        let result = coordinator.reserve(request).await;

        assert!(matches!(
            result,
            Err(ReservationError::Domain(DomainError::Booking(BookingError::InvalidAmount { .. })))
        ));
        assert_eq!(slots.slot_count().await, 0);
    }

    #[tokio::test]
    async fn failed_create_releases_the_dates() {
        let coordinator = coordinator(FailingBookings, InMemoryAvailabilityStore::new());
        let item = ItemId::new();

        let result = coordinator.reserve(cmd(item, date(7, 1), date(7, 5))).await;

        assert!(matches!(
            result,
            Err(ReservationError::Domain(DomainError::Store(_)))
        ));
        assert!(!coordinator
            .ledger()
            .check_conflict(item, date(7, 1), date(7, 5), None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn failed_release_is_reported() {
        let coordinator = coordinator(FailingBookings, StuckSlots::default());
        let request = cmd(ItemId::new(), date(7, 1), date(7, 5));
        let booking_id = request.booking_id;

        let result = coordinator.reserve(request).await;

        match result {
            Err(ReservationError::CompensationFailed { booking_id: id, .. }) => {
                assert_eq!(id, booking_id);
            }
            other => panic!("expected CompensationFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancel_releases_the_dates() {
        let coordinator = coordinator(InMemoryBookingStore::new(), InMemoryAvailabilityStore::new());
        let item = ItemId::new();
        let booking = coordinator.reserve(cmd(item, date(7, 1), date(7, 5))).await.unwrap();

        let cancelled = coordinator
            .cancel(CancelBooking::new(booking.id, booking.renter_id, "no longer needed"))
            .await
            .unwrap();

        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        coordinator.reserve(cmd(item, date(7, 1), date(7, 5))).await.unwrap();
    }

    #[tokio::test]
    async fn cancel_stands_when_release_fails() {
        let coordinator = coordinator(InMemoryBookingStore::new(), StuckSlots::default());
        let booking = coordinator
            .reserve(cmd(ItemId::new(), date(7, 1), date(7, 5)))
            .await
            .unwrap();

        let cancelled = coordinator
            .cancel(CancelBooking::new(booking.id, booking.owner_id, "item damaged"))
            .await
            .unwrap();

        assert_eq!(cancelled.status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn unauthorized_cancel_keeps_the_dates() {
        let coordinator = coordinator(InMemoryBookingStore::new(), InMemoryAvailabilityStore::new());
        let item = ItemId::new();
        let booking = coordinator.reserve(cmd(item, date(7, 1), date(7, 5))).await.unwrap();

        let result = coordinator
            .cancel(CancelBooking::new(booking.id, UserId::new(), "not mine"))
            .await;

        assert!(matches!(
            result,
            Err(ReservationError::Domain(DomainError::Booking(BookingError::Unauthorized { .. })))
        ));
        assert!(coordinator
            .ledger()
            .check_conflict(item, date(7, 1), date(7, 5), None)
            .await
            .unwrap());
    }
}
