//! Domain error types.

use common::BookingId;
use thiserror::Error;

use crate::availability::AvailabilityError;
use crate::booking::BookingError;

/// Errors raised by repositories.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The stored version did not match the version the caller loaded.
    #[error(
        "Concurrency conflict for booking {booking_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        booking_id: BookingId,
        expected: i64,
        actual: i64,
    },

    /// A record with the same identity already exists.
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// An update targeted a record that does not exist.
    #[error("Record not found: {0}")]
    Missing(String),

    /// A stored value could not be mapped back into the domain.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A booking rule was violated.
    #[error("Booking error: {0}")]
    Booking(#[from] BookingError),

    /// An availability rule was violated.
    #[error("Availability error: {0}")]
    Availability(#[from] AvailabilityError),

    /// The backing store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// An event could not be built.
    #[error("Event error: {0}")]
    Event(#[from] event_bus::ChannelError),
}

impl DomainError {
    /// True for failures caused by the caller's input or the entity's state,
    /// as opposed to infrastructure failures.
    pub fn is_rejection(&self) -> bool {
        match self {
            DomainError::Booking(_) => true,
            DomainError::Availability(e) => !matches!(e, AvailabilityError::Store(_)),
            DomainError::Store(StoreError::ConcurrencyConflict { .. }) => true,
            DomainError::Store(_) | DomainError::Event(_) => false,
        }
    }
}
