//! Availability ledger operations.
//!
//! Every write that creates a blocking slot runs check-then-insert under the
//! item's lock, so two writers can never both see a free range and both
//! claim it. Stores enforce the same rule on their own as a second line.

use chrono::NaiveDate;
use common::{BookingId, ItemId, SlotId};

use super::{
    AvailabilityError, AvailabilityRepository, AvailabilitySlot, DateRange, ItemLocks, SlotStatus,
};

/// Per-item date-range ledger.
pub struct AvailabilityLedger<R: AvailabilityRepository> {
    repository: R,
    locks: ItemLocks,
}

impl<R: AvailabilityRepository> AvailabilityLedger<R> {
    pub fn new(repository: R) -> Self {
        Self {
            repository,
            locks: ItemLocks::new(),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// True if any blocking slot of the item overlaps `[start, end)`.
    #[tracing::instrument(skip(self))]
    pub async fn check_conflict(
        &self,
        item_id: ItemId,
        start: NaiveDate,
        end: NaiveDate,
        exclude: Option<SlotId>,
    ) -> Result<bool, AvailabilityError> {
        let range = DateRange::new(start, end)?;
        let conflicts = self
            .repository
            .find_conflicts(item_id, range, exclude)
            .await?;
        Ok(!conflicts.is_empty())
    }

    /// Reserves the range for a booking.
    #[tracing::instrument(skip(self))]
    pub async fn block_dates(
        &self,
        item_id: ItemId,
        start: NaiveDate,
        end: NaiveDate,
        booking_id: BookingId,
    ) -> Result<AvailabilitySlot, AvailabilityError> {
        let range = DateRange::new(start, end)?;
        self.claim(item_id, range, SlotStatus::Booked, Some(booking_id))
            .await
    }

    /// Takes the range out of circulation without a booking.
    #[tracing::instrument(skip(self))]
    pub async fn hold_dates(
        &self,
        item_id: ItemId,
        start: NaiveDate,
        end: NaiveDate,
        status: SlotStatus,
    ) -> Result<AvailabilitySlot, AvailabilityError> {
        if !matches!(status, SlotStatus::Maintenance | SlotStatus::Blocked) {
            return Err(AvailabilityError::InvalidHoldStatus(status));
        }
        let range = DateRange::new(start, end)?;
        self.claim(item_id, range, status, None).await
    }

    /// Returns a slot to `available`. Releasing twice is harmless.
    #[tracing::instrument(skip(self))]
    pub async fn release(&self, slot_id: SlotId) -> Result<AvailabilitySlot, AvailabilityError> {
        let slot = self.repository.release(slot_id).await?;
        tracing::info!(item_id = %slot.rental_item_id, "slot released");
        Ok(slot)
    }

    /// Releases every slot held for a booking.
    #[tracing::instrument(skip(self))]
    pub async fn release_by_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<AvailabilitySlot>, AvailabilityError> {
        let released = self.repository.release_by_booking(booking_id).await?;
        if !released.is_empty() {
            tracing::info!(count = released.len(), "booking slots released");
        }
        Ok(released)
    }

    /// Slots of the item overlapping the window, any status.
    #[tracing::instrument(skip(self))]
    pub async fn list_slots(
        &self,
        item_id: ItemId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AvailabilitySlot>, AvailabilityError> {
        let range = DateRange::new(start, end)?;
        self.repository.list_for_item(item_id, range).await
    }

    async fn claim(
        &self,
        item_id: ItemId,
        range: DateRange,
        status: SlotStatus,
        booking_id: Option<BookingId>,
    ) -> Result<AvailabilitySlot, AvailabilityError> {
        let _guard = self.locks.lock(item_id).await;

        let conflicts = self.repository.find_conflicts(item_id, range, None).await?;
        if !conflicts.is_empty() {
            return Err(self.conflict(item_id, range));
        }

        let slot = AvailabilitySlot::new(item_id, range, status, booking_id);
        match self.repository.insert(&slot).await {
            Ok(()) => {}
            Err(AvailabilityError::DateConflict { .. }) => {
                return Err(self.conflict(item_id, range));
            }
            Err(e) => return Err(e),
        }

        tracing::info!(slot_id = %slot.id, status = %status, range = %range, "dates claimed");
        Ok(slot)
    }

    fn conflict(&self, item_id: ItemId, range: DateRange) -> AvailabilityError {
        metrics::counter!("availability_conflicts_total").increment(1);
        tracing::debug!(range = %range, "date conflict");
        AvailabilityError::DateConflict {
            item_id,
            start: range.start(),
            end: range.end(),
        }
    }
}
