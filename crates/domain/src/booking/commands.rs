//! Booking commands.

use chrono::{DateTime, NaiveDate, Utc};
use common::{BookingId, ItemId, UserId};
use serde::{Deserialize, Serialize};

use super::PaymentStatus;
use crate::money::Money;

/// Command to request a new booking.
///
/// The booking id is assigned by the caller so dates can be reserved for it
/// before the booking itself is persisted.
#[derive(Debug, Clone)]
pub struct CreateBooking {
    pub booking_id: BookingId,
    pub renter_id: UserId,
    pub owner_id: UserId,
    pub rental_item_id: ItemId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub daily_rate: Money,
    pub security_deposit: Money,
}

impl CreateBooking {
    /// Creates a new CreateBooking command with a generated booking ID.
    pub fn new(
        renter_id: UserId,
        owner_id: UserId,
        rental_item_id: ItemId,
        start_date: NaiveDate,
        end_date: NaiveDate,
        daily_rate: Money,
        security_deposit: Money,
    ) -> Self {
        Self {
            booking_id: BookingId::new(),
            renter_id,
            owner_id,
            rental_item_id,
            start_date,
            end_date,
            daily_rate,
            security_deposit,
        }
    }
}

/// Command for the owner to accept a pending booking.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmBooking {
    pub booking_id: BookingId,
    pub owner_id: UserId,
}

impl ConfirmBooking {
    pub fn new(booking_id: BookingId, owner_id: UserId) -> Self {
        Self {
            booking_id,
            owner_id,
        }
    }
}

/// Command for the renter or owner to cancel a booking.
#[derive(Debug, Clone)]
pub struct CancelBooking {
    pub booking_id: BookingId,
    pub user_id: UserId,
    pub reason: String,
}

impl CancelBooking {
    pub fn new(booking_id: BookingId, user_id: UserId, reason: impl Into<String>) -> Self {
        Self {
            booking_id,
            user_id,
            reason: reason.into(),
        }
    }
}

/// Command for the owner to hand the item over.
#[derive(Debug, Clone, Copy)]
pub struct ActivateBooking {
    pub booking_id: BookingId,
    pub owner_id: UserId,
}

impl ActivateBooking {
    pub fn new(booking_id: BookingId, owner_id: UserId) -> Self {
        Self {
            booking_id,
            owner_id,
        }
    }
}

/// Command for the owner to close a running rental.
#[derive(Debug, Clone, Copy)]
pub struct CompleteBooking {
    pub booking_id: BookingId,
    pub owner_id: UserId,
}

impl CompleteBooking {
    pub fn new(booking_id: BookingId, owner_id: UserId) -> Self {
        Self {
            booking_id,
            owner_id,
        }
    }
}

/// Payment outcome reported by the payment service.
#[derive(Debug, Clone)]
pub struct RecordPayment {
    pub booking_id: BookingId,
    pub payment_id: String,
    pub payment_status: PaymentStatus,
}

impl RecordPayment {
    pub fn new(
        booking_id: BookingId,
        payment_id: impl Into<String>,
        payment_status: PaymentStatus,
    ) -> Self {
        Self {
            booking_id,
            payment_id: payment_id.into(),
            payment_status,
        }
    }
}

/// Fields a renter or owner may change on a booking.
///
/// `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingUpdate {
    pub pickup_address: Option<String>,
    pub pickup_notes: Option<String>,
    pub pickup_time: Option<DateTime<Utc>>,
    pub return_address: Option<String>,
    pub return_notes: Option<String>,
    pub return_time: Option<DateTime<Utc>>,
    pub agreement_signed: Option<bool>,
    pub agreement_url: Option<String>,
}

impl BookingUpdate {
    /// Returns true if no field would change.
    pub fn is_empty(&self) -> bool {
        self == &BookingUpdate::default()
    }
}

/// Command to apply a [`BookingUpdate`].
#[derive(Debug, Clone)]
pub struct UpdateBooking {
    pub booking_id: BookingId,
    pub user_id: UserId,
    pub update: BookingUpdate,
}

impl UpdateBooking {
    pub fn new(booking_id: BookingId, user_id: UserId, update: BookingUpdate) -> Self {
        Self {
            booking_id,
            user_id,
            update,
        }
    }
}
