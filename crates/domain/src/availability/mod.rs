//! Availability ledger: per-item date-range slots and conflict detection.

mod ledger;
mod locks;
mod postgres;
mod repository;
mod slot;

pub use ledger::AvailabilityLedger;
pub use locks::ItemLocks;
pub use postgres::PostgresAvailabilityStore;
pub use repository::{AvailabilityRepository, InMemoryAvailabilityStore};
pub use slot::{AvailabilitySlot, DateRange, SlotStatus};

use chrono::NaiveDate;
use common::{ItemId, SlotId};
use thiserror::Error;

use crate::error::StoreError;

/// Errors that can occur during availability operations.
#[derive(Debug, Error)]
pub enum AvailabilityError {
    /// The end date precedes the start date.
    #[error("Invalid dates: end {end} is before start {start}")]
    InvalidDates { start: NaiveDate, end: NaiveDate },

    /// The requested range overlaps a booked or held slot.
    #[error("Dates {start}..{end} conflict with an existing slot for item {item_id}")]
    DateConflict {
        item_id: ItemId,
        start: NaiveDate,
        end: NaiveDate,
    },

    /// No slot exists with this id.
    #[error("Availability slot not found: {0}")]
    SlotNotFound(SlotId),

    /// Holds may only use the maintenance or blocked statuses.
    #[error("Cannot hold dates with status {0}")]
    InvalidHoldStatus(SlotStatus),

    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<sqlx::Error> for AvailabilityError {
    fn from(e: sqlx::Error) -> Self {
        AvailabilityError::Store(StoreError::Database(e))
    }
}
