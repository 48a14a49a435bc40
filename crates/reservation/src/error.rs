//! Reservation error types.

use common::BookingId;
use domain::{AvailabilityError, DomainError};
use thiserror::Error;

/// Errors that can occur while reserving or cancelling.
#[derive(Debug, Error)]
pub enum ReservationError {
    /// The ledger refused the dates, or failed.
    #[error(transparent)]
    Availability(#[from] AvailabilityError),

    /// The booking service refused the request, or failed.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Creating the booking failed and its reserved dates could not be
    /// released either. The slot stays blocked until released by hand.
    #[error("Booking {booking_id} failed ({cause}) and releasing its dates failed ({release})")]
    CompensationFailed {
        booking_id: BookingId,
        cause: DomainError,
        release: AvailabilityError,
    },
}

impl ReservationError {
    /// True for errors caused by the request rather than by a failing store.
    pub fn is_rejection(&self) -> bool {
        match self {
            ReservationError::Availability(AvailabilityError::Store(_)) => false,
            ReservationError::Availability(_) => true,
            ReservationError::Domain(e) => e.is_rejection(),
            ReservationError::CompensationFailed { .. } => false,
        }
    }
}
