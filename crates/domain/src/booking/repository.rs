use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{BookingId, Page, PageRequest, UserId};
use event_bus::{EventId, InMemoryOutbox, Outbox, OutboxRecord};
use tokio::sync::RwLock;

use super::Booking;
use crate::error::StoreError;

/// Persistence for bookings and the events their changes produce.
///
/// `insert` and `update` write the booking and its outbox records as one
/// unit: either both become visible or neither does.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Stores a new booking. Fails with [`StoreError::Duplicate`] if the id exists.
    async fn insert(&self, booking: &Booking, outbox: &[OutboxRecord]) -> Result<(), StoreError>;

    /// Replaces a booking whose stored version equals `expected_version`.
    async fn update(
        &self,
        booking: &Booking,
        expected_version: i64,
        outbox: &[OutboxRecord],
    ) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, StoreError>;

    /// Bookings rented by a user, newest first.
    async fn list_by_renter(
        &self,
        renter_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Booking>, StoreError>;

    /// Bookings of items owned by a user, newest first.
    async fn list_by_owner(
        &self,
        owner_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Booking>, StoreError>;
}

/// In-memory booking store for tests and single-process runs.
#[derive(Clone, Default)]
pub struct InMemoryBookingStore {
    bookings: Arc<RwLock<HashMap<BookingId, Booking>>>,
    outbox: InMemoryOutbox,
}

impl InMemoryBookingStore {
    /// Creates a new empty in-memory booking store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of bookings stored.
    pub async fn booking_count(&self) -> usize {
        self.bookings.read().await.len()
    }

    /// Every outbox record written so far.
    pub async fn outbox_records(&self) -> Vec<OutboxRecord> {
        self.outbox.records().await
    }

    async fn list_where(
        &self,
        page: PageRequest,
        predicate: impl Fn(&Booking) -> bool,
    ) -> Page<Booking> {
        let bookings = self.bookings.read().await;
        let mut matching: Vec<_> = bookings.values().filter(|b| predicate(*b)).cloned().collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.id.as_uuid().cmp(&a.id.as_uuid()))
        });
        Page::from_sorted(matching, page)
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingStore {
    async fn insert(&self, booking: &Booking, outbox: &[OutboxRecord]) -> Result<(), StoreError> {
        let mut bookings = self.bookings.write().await;
        if bookings.contains_key(&booking.id) {
            return Err(StoreError::Duplicate(format!("booking {}", booking.id)));
        }
        bookings.insert(booking.id, booking.clone());
        // Appended under the booking write lock.
        self.outbox.append(outbox).await;
        Ok(())
    }

    async fn update(
        &self,
        booking: &Booking,
        expected_version: i64,
        outbox: &[OutboxRecord],
    ) -> Result<(), StoreError> {
        let mut bookings = self.bookings.write().await;
        let stored = bookings
            .get_mut(&booking.id)
            .ok_or_else(|| StoreError::Missing(format!("booking {}", booking.id)))?;

        if stored.version != expected_version {
            return Err(StoreError::ConcurrencyConflict {
                booking_id: booking.id,
                expected: expected_version,
                actual: stored.version,
            });
        }

        *stored = booking.clone();
        self.outbox.append(outbox).await;
        Ok(())
    }

    async fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn list_by_renter(
        &self,
        renter_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Booking>, StoreError> {
        Ok(self.list_where(page, |b| b.renter_id == renter_id).await)
    }

    async fn list_by_owner(
        &self,
        owner_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Booking>, StoreError> {
        Ok(self.list_where(page, |b| b.owner_id == owner_id).await)
    }
}

#[async_trait]
impl Outbox for InMemoryBookingStore {
    async fn fetch_pending(
        &self,
        limit: usize,
        max_attempts: u32,
    ) -> event_bus::Result<Vec<OutboxRecord>> {
        self.outbox.fetch_pending(limit, max_attempts).await
    }

    async fn mark_published(&self, event_ids: &[EventId]) -> event_bus::Result<()> {
        self.outbox.mark_published(event_ids).await
    }

    async fn mark_failed(&self, event_id: EventId, error: &str) -> event_bus::Result<()> {
        self.outbox.mark_failed(event_id, error).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, Utc};
    use common::ItemId;

    use super::*;
    use crate::booking::CreateBooking;
    use crate::money::Money;

    fn booking_for(renter: UserId, owner: UserId, minutes_ago: i64) -> Booking {
        let cmd = CreateBooking::new(
            renter,
            owner,
            ItemId::new(),
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 3).unwrap(),
            Money::from_cents(1_000),
            Money::zero(),
        );
        let (booking, _) = Booking::create(&cmd, Utc::now() - Duration::minutes(minutes_ago)).unwrap();
        booking
    }

    #[tokio::test]
    async fn insert_writes_booking_and_outbox() {
        let store = InMemoryBookingStore::new();
        let cmd = CreateBooking::new(
            UserId::new(),
            UserId::new(),
            ItemId::new(),
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 3).unwrap(),
            Money::from_cents(1_000),
            Money::zero(),
        );
        let (booking, event) = Booking::create(&cmd, Utc::now()).unwrap();
        let record = event.to_outbox_record().unwrap();

        store.insert(&booking, &[record.clone()]).await.unwrap();

        assert_eq!(store.find_by_id(booking.id).await.unwrap(), Some(booking));
        let pending = store.fetch_pending(10, 3).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_id(), record.event_id());
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_id() {
        let store = InMemoryBookingStore::new();
        let booking = booking_for(UserId::new(), UserId::new(), 0);
        store.insert(&booking, &[]).await.unwrap();
        assert!(matches!(
            store.insert(&booking, &[]).await,
            Err(StoreError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn update_checks_version() {
        let store = InMemoryBookingStore::new();
        let mut booking = booking_for(UserId::new(), UserId::new(), 0);
        store.insert(&booking, &[]).await.unwrap();

        booking.version = 2;
        store.update(&booking, 1, &[]).await.unwrap();

        let stale = booking.clone();
        let result = store.update(&stale, 1, &[]).await;
        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict {
                expected: 1,
                actual: 2,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn lists_are_filtered_and_newest_first() {
        let store = InMemoryBookingStore::new();
        let renter = UserId::new();
        let owner = UserId::new();

        let old = booking_for(renter, owner, 30);
        let new = booking_for(renter, UserId::new(), 1);
        let other = booking_for(UserId::new(), owner, 10);
        for b in [&old, &new, &other] {
            store.insert(b, &[]).await.unwrap();
        }

        let page = store
            .list_by_renter(renter, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].id, new.id);
        assert_eq!(page.items[1].id, old.id);

        let page = store
            .list_by_owner(owner, PageRequest::new(Some(1), Some(1)))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, other.id);
    }
}
