use async_trait::async_trait;
use common::{BookingId, ItemId, SlotId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::{AvailabilityError, AvailabilityRepository, AvailabilitySlot, DateRange, SlotStatus};
use crate::error::StoreError;

const SLOT_COLUMNS: &str =
    "id, rental_item_id, start_date, end_date, status, booking_id, created_at, updated_at";

/// PostgreSQL-backed availability store.
///
/// Overlap between blocking slots of one item is enforced by the
/// `availability_slots_no_overlap` exclusion constraint.
#[derive(Clone)]
pub struct PostgresAvailabilityStore {
    pool: PgPool,
}

impl PostgresAvailabilityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_slot(row: PgRow) -> Result<AvailabilitySlot, StoreError> {
        let status: String = row.try_get("status")?;

        Ok(AvailabilitySlot {
            id: SlotId::from_uuid(row.try_get::<Uuid, _>("id")?),
            rental_item_id: ItemId::from_uuid(row.try_get::<Uuid, _>("rental_item_id")?),
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            status: status.parse::<SlotStatus>().map_err(StoreError::Corrupt)?,
            booking_id: row
                .try_get::<Option<Uuid>, _>("booking_id")?
                .map(BookingId::from_uuid),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn rows_to_slots(rows: Vec<PgRow>) -> Result<Vec<AvailabilitySlot>, AvailabilityError> {
        Ok(rows
            .into_iter()
            .map(Self::row_to_slot)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

#[async_trait]
impl AvailabilityRepository for PostgresAvailabilityStore {
    async fn find_conflicts(
        &self,
        item_id: ItemId,
        range: DateRange,
        exclude: Option<SlotId>,
    ) -> Result<Vec<AvailabilitySlot>, AvailabilityError> {
        let rows = sqlx::query(&format!(
            "SELECT {SLOT_COLUMNS} FROM availability_slots \
             WHERE rental_item_id = $1 AND status <> 'available' \
             AND start_date < $3 AND end_date > $2 \
             AND ($4::uuid IS NULL OR id <> $4) \
             ORDER BY start_date"
        ))
        .bind(item_id.as_uuid())
        .bind(range.start())
        .bind(range.end())
        .bind(exclude.map(|id| id.as_uuid()))
        .fetch_all(&self.pool)
        .await?;

        Self::rows_to_slots(rows)
    }

    async fn insert(&self, slot: &AvailabilitySlot) -> Result<(), AvailabilityError> {
        sqlx::query(&format!(
            "INSERT INTO availability_slots ({SLOT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        ))
        .bind(slot.id.as_uuid())
        .bind(slot.rental_item_id.as_uuid())
        .bind(slot.start_date)
        .bind(slot.end_date)
        .bind(slot.status.as_str())
        .bind(slot.booking_id.map(|id| id.as_uuid()))
        .bind(slot.created_at)
        .bind(slot.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("availability_slots_no_overlap")
            {
                return AvailabilityError::DateConflict {
                    item_id: slot.rental_item_id,
                    start: slot.start_date,
                    end: slot.end_date,
                };
            }
            AvailabilityError::from(e)
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: SlotId) -> Result<Option<AvailabilitySlot>, AvailabilityError> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {SLOT_COLUMNS} FROM availability_slots WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Self::row_to_slot).transpose()?)
    }

    async fn release(&self, id: SlotId) -> Result<AvailabilitySlot, AvailabilityError> {
        // A no-op for slots that are already available; updated_at is kept.
        let row: Option<PgRow> = sqlx::query(&format!(
            "UPDATE availability_slots SET \
             updated_at = CASE WHEN status = 'available' THEN updated_at ELSE NOW() END, \
             status = 'available' \
             WHERE id = $1 RETURNING {SLOT_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_slot)
            .transpose()?
            .ok_or(AvailabilityError::SlotNotFound(id))
    }

    async fn release_by_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<AvailabilitySlot>, AvailabilityError> {
        let rows = sqlx::query(&format!(
            "UPDATE availability_slots SET status = 'available', updated_at = NOW() \
             WHERE booking_id = $1 AND status <> 'available' RETURNING {SLOT_COLUMNS}"
        ))
        .bind(booking_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        Self::rows_to_slots(rows)
    }

    async fn list_for_item(
        &self,
        item_id: ItemId,
        range: DateRange,
    ) -> Result<Vec<AvailabilitySlot>, AvailabilityError> {
        let rows = sqlx::query(&format!(
            "SELECT {SLOT_COLUMNS} FROM availability_slots \
             WHERE rental_item_id = $1 AND start_date < $3 AND end_date > $2 \
             ORDER BY start_date, created_at"
        ))
        .bind(item_id.as_uuid())
        .bind(range.start())
        .bind(range.end())
        .fetch_all(&self.pool)
        .await?;

        Self::rows_to_slots(rows)
    }
}
