//! Booking entity and related types.

mod commands;
mod entity;
mod events;
mod postgres;
mod repository;
mod service;
mod status;

pub use commands::*;
pub use entity::Booking;
pub use events::{BookingEvent, BookingEventKind};
pub use postgres::PostgresBookingStore;
pub use repository::{BookingRepository, InMemoryBookingStore};
pub use service::BookingService;
pub use status::{BookingStatus, PaymentStatus};

use chrono::NaiveDate;
use common::{BookingId, UserId};
use thiserror::Error;

use crate::money::Money;

/// Errors that can occur during booking operations.
#[derive(Debug, Error)]
pub enum BookingError {
    /// No booking exists with this id.
    #[error("Booking not found: {0}")]
    NotFound(BookingId),

    /// The acting user is not allowed to perform this action.
    #[error("User {actor} is not allowed to {action} this booking")]
    Unauthorized { actor: UserId, action: &'static str },

    /// The booking is not in a state that allows this action.
    #[error("Invalid status: cannot {action} a {current} booking")]
    InvalidStatus {
        current: BookingStatus,
        action: &'static str,
    },

    /// The end date precedes the start date.
    #[error("Invalid dates: end {end} is before start {start}")]
    InvalidDates { start: NaiveDate, end: NaiveDate },

    /// A monetary input is out of range.
    #[error("Invalid amount for {field}: {amount}")]
    InvalidAmount { field: &'static str, amount: Money },

    /// The booking was already cancelled.
    #[error("Booking is already cancelled")]
    AlreadyCancelled,

    /// The booking has progressed too far to be cancelled.
    #[error("Cannot cancel a {current} booking")]
    CannotCancel { current: BookingStatus },

    /// Activation requires a signed rental agreement.
    #[error("Rental agreement has not been signed")]
    AgreementNotSigned,

    /// Activation requires a completed payment.
    #[error("Payment has not been completed")]
    PaymentNotCompleted,
}
