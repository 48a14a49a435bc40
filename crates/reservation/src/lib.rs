//! Reservation coordination between bookings and the availability ledger.
//!
//! Bookings and availability slots live in separate stores with no shared
//! transaction. This crate keeps them consistent:
//! - [`ReservationCoordinator`] reserves dates before creating a booking and
//!   releases them again if the booking cannot be stored
//! - [`AvailabilityReconciler`] releases slots when a `booking.cancelled`
//!   event arrives, covering cancellations that did not go through the
//!   coordinator or whose release failed

pub mod coordinator;
pub mod error;
pub mod reconciler;

pub use coordinator::ReservationCoordinator;
pub use error::ReservationError;
pub use reconciler::{AVAILABILITY_BINDING, AVAILABILITY_QUEUE, AvailabilityReconciler};
