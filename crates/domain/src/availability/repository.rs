use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{BookingId, ItemId, SlotId};
use tokio::sync::RwLock;

use super::{AvailabilityError, AvailabilitySlot, DateRange, SlotStatus};

/// Persistence for availability slots.
///
/// Implementations must refuse to store a blocking slot that overlaps another
/// blocking slot of the same item, independently of any caller-side check.
#[async_trait]
pub trait AvailabilityRepository: Send + Sync {
    /// Blocking slots of the item overlapping `range`, minus `exclude`.
    async fn find_conflicts(
        &self,
        item_id: ItemId,
        range: DateRange,
        exclude: Option<SlotId>,
    ) -> Result<Vec<AvailabilitySlot>, AvailabilityError>;

    /// Stores a new slot. Fails with [`AvailabilityError::DateConflict`] on overlap.
    async fn insert(&self, slot: &AvailabilitySlot) -> Result<(), AvailabilityError>;

    async fn find_by_id(&self, id: SlotId) -> Result<Option<AvailabilitySlot>, AvailabilityError>;

    /// Sets a slot back to available and returns it.
    async fn release(&self, id: SlotId) -> Result<AvailabilitySlot, AvailabilityError>;

    /// Releases every blocking slot linked to a booking and returns them.
    async fn release_by_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<AvailabilitySlot>, AvailabilityError>;

    /// Slots of the item overlapping `range`, in start order, any status.
    async fn list_for_item(
        &self,
        item_id: ItemId,
        range: DateRange,
    ) -> Result<Vec<AvailabilitySlot>, AvailabilityError>;
}

/// In-memory availability store.
#[derive(Clone, Default)]
pub struct InMemoryAvailabilityStore {
    slots: Arc<RwLock<HashMap<SlotId, AvailabilitySlot>>>,
}

impl InMemoryAvailabilityStore {
    /// Creates a new empty in-memory availability store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of slots stored, released ones included.
    pub async fn slot_count(&self) -> usize {
        self.slots.read().await.len()
    }
}

#[async_trait]
impl AvailabilityRepository for InMemoryAvailabilityStore {
    async fn find_conflicts(
        &self,
        item_id: ItemId,
        range: DateRange,
        exclude: Option<SlotId>,
    ) -> Result<Vec<AvailabilitySlot>, AvailabilityError> {
        let slots = self.slots.read().await;
        Ok(slots
            .values()
            .filter(|s| s.rental_item_id == item_id && Some(s.id) != exclude)
            .filter(|s| s.conflicts_with(&range))
            .cloned()
            .collect())
    }

    async fn insert(&self, slot: &AvailabilitySlot) -> Result<(), AvailabilityError> {
        let mut slots = self.slots.write().await;

        // Re-check under the write lock.
        if slot.status.is_blocking() {
            let range = slot.range();
            let overlaps = slots
                .values()
                .any(|s| s.rental_item_id == slot.rental_item_id && s.conflicts_with(&range));
            if overlaps {
                return Err(AvailabilityError::DateConflict {
                    item_id: slot.rental_item_id,
                    start: slot.start_date,
                    end: slot.end_date,
                });
            }
        }

        slots.insert(slot.id, slot.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: SlotId) -> Result<Option<AvailabilitySlot>, AvailabilityError> {
        Ok(self.slots.read().await.get(&id).cloned())
    }

    async fn release(&self, id: SlotId) -> Result<AvailabilitySlot, AvailabilityError> {
        let mut slots = self.slots.write().await;
        let slot = slots
            .get_mut(&id)
            .ok_or(AvailabilityError::SlotNotFound(id))?;

        if slot.status != SlotStatus::Available {
            slot.status = SlotStatus::Available;
            slot.updated_at = Utc::now();
        }
        Ok(slot.clone())
    }

    async fn release_by_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<AvailabilitySlot>, AvailabilityError> {
        let now = Utc::now();
        let mut slots = self.slots.write().await;
        let released = slots
            .values_mut()
            .filter(|s| s.booking_id == Some(booking_id) && s.status.is_blocking())
            .map(|s| {
                s.status = SlotStatus::Available;
                s.updated_at = now;
                s.clone()
            })
            .collect();
        Ok(released)
    }

    async fn list_for_item(
        &self,
        item_id: ItemId,
        range: DateRange,
    ) -> Result<Vec<AvailabilitySlot>, AvailabilityError> {
        let slots = self.slots.read().await;
        let mut matching: Vec<_> = slots
            .values()
            .filter(|s| s.rental_item_id == item_id && s.range().overlaps(&range))
            .cloned()
            .collect();
        matching.sort_by_key(|s| (s.start_date, s.created_at));
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn range(m1: u32, d1: u32, m2: u32, d2: u32) -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2025, m1, d1).unwrap(),
            NaiveDate::from_ymd_opt(2025, m2, d2).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn insert_rejects_overlapping_blocking_slot() {
        let store = InMemoryAvailabilityStore::new();
        let item = ItemId::new();
        store
            .insert(&AvailabilitySlot::new(item, range(7, 1, 7, 5), SlotStatus::Booked, None))
            .await
            .unwrap();

        let clash = AvailabilitySlot::new(item, range(7, 3, 7, 6), SlotStatus::Maintenance, None);
        assert!(matches!(
            store.insert(&clash).await,
            Err(AvailabilityError::DateConflict { .. })
        ));

        let other_item = AvailabilitySlot::new(ItemId::new(), range(7, 3, 7, 6), SlotStatus::Booked, None);
        store.insert(&other_item).await.unwrap();
    }

    #[tokio::test]
    async fn released_slot_frees_its_dates() {
        let store = InMemoryAvailabilityStore::new();
        let item = ItemId::new();
        let slot = AvailabilitySlot::new(item, range(7, 1, 7, 5), SlotStatus::Booked, None);
        store.insert(&slot).await.unwrap();

        let released = store.release(slot.id).await.unwrap();
        assert_eq!(released.status, SlotStatus::Available);

        let again = store.release(slot.id).await.unwrap();
        assert_eq!(again.status, SlotStatus::Available);

        assert!(store
            .find_conflicts(item, range(7, 1, 7, 5), None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn release_unknown_slot_fails() {
        let store = InMemoryAvailabilityStore::new();
        let id = SlotId::new();
        assert!(matches!(
            store.release(id).await,
            Err(AvailabilityError::SlotNotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn release_by_booking_returns_only_blocking_linked_slots() {
        let store = InMemoryAvailabilityStore::new();
        let item = ItemId::new();
        let booking = BookingId::new();
        let linked = AvailabilitySlot::new(item, range(7, 1, 7, 5), SlotStatus::Booked, Some(booking));
        let unrelated = AvailabilitySlot::new(item, range(8, 1, 8, 5), SlotStatus::Booked, Some(BookingId::new()));
        store.insert(&linked).await.unwrap();
        store.insert(&unrelated).await.unwrap();

        let released = store.release_by_booking(booking).await.unwrap();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].id, linked.id);

        assert!(store.release_by_booking(booking).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn exclude_skips_the_given_slot() {
        let store = InMemoryAvailabilityStore::new();
        let item = ItemId::new();
        let slot = AvailabilitySlot::new(item, range(7, 1, 7, 5), SlotStatus::Booked, None);
        store.insert(&slot).await.unwrap();

        let conflicts = store
            .find_conflicts(item, range(7, 2, 7, 3), Some(slot.id))
            .await
            .unwrap();
        assert!(conflicts.is_empty());
    }
}
