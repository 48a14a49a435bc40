//! Booking service providing the booking lifecycle operations.

use chrono::Utc;
use common::{BookingId, Page, PageRequest, UserId};

use super::{
    ActivateBooking, Booking, BookingError, BookingEvent, BookingRepository, CancelBooking,
    CompleteBooking, ConfirmBooking, CreateBooking, RecordPayment, UpdateBooking,
};
use crate::error::DomainError;

/// Service for managing bookings.
///
/// Each mutating operation loads the booking, applies the transition on the
/// entity and persists the result together with its event in a single
/// repository call. Concurrent writers to the same booking are detected by
/// version and the loser gets a concurrency conflict.
pub struct BookingService<R: BookingRepository> {
    repository: R,
}

impl<R: BookingRepository> BookingService<R> {
    /// Creates a new booking service on top of a repository.
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    /// Returns a reference to the underlying repository.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Prices and stores a pending booking, recording `booking.created`.
    ///
    /// Does not reserve dates; see the reservation coordinator for that.
    #[tracing::instrument(skip(self), fields(booking_id = %cmd.booking_id, item_id = %cmd.rental_item_id))]
    pub async fn create(&self, cmd: CreateBooking) -> Result<Booking, DomainError> {
        let (booking, event) = Booking::create(&cmd, Utc::now())?;
        let record = event.to_outbox_record()?;

        self.repository.insert(&booking, &[record]).await?;

        metrics::counter!("bookings_created_total").increment(1);
        tracing::info!(
            booking_number = %booking.booking_number,
            total_amount = %booking.total_amount,
            "booking created"
        );
        Ok(booking)
    }

    /// Owner confirms a pending booking.
    #[tracing::instrument(skip(self))]
    pub async fn confirm(&self, cmd: ConfirmBooking) -> Result<Booking, DomainError> {
        self.transition(cmd.booking_id, |booking| {
            booking.confirm(cmd.owner_id, Utc::now()).map(Some)
        })
        .await
    }

    /// Renter or owner cancels a booking.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, cmd: CancelBooking) -> Result<Booking, DomainError> {
        let CancelBooking {
            booking_id,
            user_id,
            reason,
        } = cmd;
        self.transition(booking_id, |booking| {
            booking.cancel(user_id, reason, Utc::now()).map(Some)
        })
        .await
    }

    /// Owner starts the rental.
    #[tracing::instrument(skip(self))]
    pub async fn activate(&self, cmd: ActivateBooking) -> Result<Booking, DomainError> {
        self.transition(cmd.booking_id, |booking| {
            booking.activate(cmd.owner_id, Utc::now()).map(Some)
        })
        .await
    }

    /// Owner closes the rental.
    #[tracing::instrument(skip(self))]
    pub async fn complete(&self, cmd: CompleteBooking) -> Result<Booking, DomainError> {
        self.transition(cmd.booking_id, |booking| {
            booking.complete(cmd.owner_id, Utc::now()).map(Some)
        })
        .await
    }

    /// Stores the payment outcome without changing the status.
    #[tracing::instrument(skip(self))]
    pub async fn record_payment(&self, cmd: RecordPayment) -> Result<Booking, DomainError> {
        let RecordPayment {
            booking_id,
            payment_id,
            payment_status,
        } = cmd;
        self.transition(booking_id, |booking| {
            booking
                .record_payment(payment_id, payment_status, Utc::now())
                .map(|()| None)
        })
        .await
    }

    /// Applies logistics and agreement changes.
    #[tracing::instrument(skip(self))]
    pub async fn update(&self, cmd: UpdateBooking) -> Result<Booking, DomainError> {
        let UpdateBooking {
            booking_id,
            user_id,
            update,
        } = cmd;
        self.transition(booking_id, |booking| {
            booking
                .apply_update(user_id, update, Utc::now())
                .map(|()| None)
        })
        .await
    }

    /// Loads a booking by ID.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, booking_id: BookingId) -> Result<Booking, DomainError> {
        self.repository
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(booking_id).into())
    }

    /// Bookings rented by a user, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_by_renter(
        &self,
        renter_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Booking>, DomainError> {
        Ok(self.repository.list_by_renter(renter_id, page).await?)
    }

    /// Bookings of items owned by a user, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_by_owner(
        &self,
        owner_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Booking>, DomainError> {
        Ok(self.repository.list_by_owner(owner_id, page).await?)
    }

    async fn transition<F>(&self, booking_id: BookingId, apply: F) -> Result<Booking, DomainError>
    where
        F: FnOnce(&mut Booking) -> Result<Option<BookingEvent>, BookingError> + Send,
    {
        let mut booking = self.get(booking_id).await?;
        let expected_version = booking.version;

        let event = apply(&mut booking)?;
        booking.version = expected_version + 1;

        let records = match &event {
            Some(event) => vec![event.to_outbox_record()?],
            None => Vec::new(),
        };
        self.repository
            .update(&booking, expected_version, &records)
            .await?;

        if let Some(event) = event {
            metrics::counter!("bookings_transitions_total", "status" => booking.status.as_str())
                .increment(1);
            tracing::info!(
                booking_id = %booking.id,
                status = %booking.status,
                routing_key = event.kind.routing_key(),
                "booking transitioned"
            );
        }
        Ok(booking)
    }
}
