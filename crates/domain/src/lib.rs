//! Domain layer for the rental booking engine.
//!
//! This crate provides:
//! - the [`Booking`] entity, its status machine and pricing rules
//! - [`BookingService`], which persists bookings and their outbox events
//! - the availability ledger ([`AvailabilityLedger`]) that prevents an item
//!   from being booked twice for overlapping dates
//! - in-memory and PostgreSQL repositories for both

pub mod availability;
pub mod booking;
pub mod error;
pub mod money;

pub use availability::{
    AvailabilityError, AvailabilityLedger, AvailabilityRepository, AvailabilitySlot, DateRange,
    InMemoryAvailabilityStore, ItemLocks, PostgresAvailabilityStore, SlotStatus,
};
pub use booking::{
    ActivateBooking, Booking, BookingError, BookingEvent, BookingEventKind, BookingRepository,
    BookingService, BookingStatus, BookingUpdate, CancelBooking, CompleteBooking, ConfirmBooking,
    CreateBooking, InMemoryBookingStore, PaymentStatus, PostgresBookingStore, RecordPayment,
    UpdateBooking,
};
pub use error::{DomainError, StoreError};
pub use money::{Money, Pricing, SERVICE_FEE_BASIS_POINTS};
