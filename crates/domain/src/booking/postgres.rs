use std::time::Duration;

use async_trait::async_trait;
use common::{BookingId, ItemId, Page, PageRequest, UserId};
use event_bus::{ChannelError, EventEnvelope, EventId, Outbox, OutboxRecord};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use super::{Booking, BookingRepository, BookingStatus, PaymentStatus};
use crate::error::StoreError;
use crate::money::Money;

const BOOKING_COLUMNS: &str = r#"
    id, booking_number, renter_id, owner_id, rental_item_id, status,
    start_date, end_date, total_days, daily_rate_cents, subtotal_cents,
    service_fee_cents, security_deposit_cents, total_amount_cents,
    cancelled_by, cancellation_reason, payment_id, payment_status,
    pickup_address, pickup_notes, pickup_time, return_address, return_notes, return_time,
    agreement_signed, agreement_url, created_at, updated_at, version
"#;

/// PostgreSQL-backed booking store.
///
/// Outbox records live in `booking_outbox` and are written in the same
/// transaction as the booking row. Fetching pending records claims them, so
/// several relays can drain one database without publishing a row twice.
#[derive(Clone)]
pub struct PostgresBookingStore {
    pool: PgPool,
}

impl PostgresBookingStore {
    /// Creates a new PostgreSQL booking store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_booking(row: PgRow) -> Result<Booking, StoreError> {
        let status: String = row.try_get("status")?;
        let status = status.parse::<BookingStatus>().map_err(StoreError::Corrupt)?;
        let payment_status = row
            .try_get::<Option<String>, _>("payment_status")?
            .map(|s| s.parse::<PaymentStatus>())
            .transpose()
            .map_err(StoreError::Corrupt)?;

        Ok(Booking {
            id: BookingId::from_uuid(row.try_get::<Uuid, _>("id")?),
            booking_number: row.try_get("booking_number")?,
            renter_id: UserId::from_uuid(row.try_get::<Uuid, _>("renter_id")?),
            owner_id: UserId::from_uuid(row.try_get::<Uuid, _>("owner_id")?),
            rental_item_id: ItemId::from_uuid(row.try_get::<Uuid, _>("rental_item_id")?),
            status,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            total_days: row.try_get("total_days")?,
            daily_rate: Money::from_cents(row.try_get("daily_rate_cents")?),
            subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
            service_fee: Money::from_cents(row.try_get("service_fee_cents")?),
            security_deposit: Money::from_cents(row.try_get("security_deposit_cents")?),
            total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
            cancelled_by: row
                .try_get::<Option<Uuid>, _>("cancelled_by")?
                .map(UserId::from_uuid),
            cancellation_reason: row.try_get("cancellation_reason")?,
            payment_id: row.try_get("payment_id")?,
            payment_status,
            pickup_address: row.try_get("pickup_address")?,
            pickup_notes: row.try_get("pickup_notes")?,
            pickup_time: row.try_get("pickup_time")?,
            return_address: row.try_get("return_address")?,
            return_notes: row.try_get("return_notes")?,
            return_time: row.try_get("return_time")?,
            agreement_signed: row.try_get("agreement_signed")?,
            agreement_url: row.try_get("agreement_url")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        })
    }

    fn row_to_outbox_record(row: PgRow) -> Result<OutboxRecord, StoreError> {
        let envelope: serde_json::Value = row.try_get("envelope")?;
        let envelope: EventEnvelope = serde_json::from_value(envelope)?;
        let attempts: i32 = row.try_get("attempts")?;

        Ok(OutboxRecord {
            exchange: row.try_get("exchange")?,
            envelope,
            attempts: u32::try_from(attempts).unwrap_or_default(),
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
            published_at: row.try_get("published_at")?,
        })
    }

    async fn insert_outbox(
        tx: &mut Transaction<'_, Postgres>,
        records: &[OutboxRecord],
    ) -> Result<(), StoreError> {
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO booking_outbox (event_id, exchange, event_type, envelope, attempts, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(record.event_id().as_uuid())
            .bind(&record.exchange)
            .bind(&record.envelope.event_type)
            .bind(serde_json::to_value(&record.envelope)?)
            .bind(i32::try_from(record.attempts).unwrap_or(i32::MAX))
            .bind(record.created_at)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn list_by_column(
        &self,
        column: &'static str,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Booking>, StoreError> {
        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM bookings WHERE {column} = $1"
        ))
        .bind(user_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE {column} = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(user_id.as_uuid())
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(Self::row_to_booking)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            total: usize::try_from(total).unwrap_or_default(),
        })
    }
}

#[async_trait]
impl BookingRepository for PostgresBookingStore {
    async fn insert(&self, booking: &Booking, outbox: &[OutboxRecord]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS}) VALUES (\
             $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, \
             $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29)"
        ))
        .bind(booking.id.as_uuid())
        .bind(&booking.booking_number)
        .bind(booking.renter_id.as_uuid())
        .bind(booking.owner_id.as_uuid())
        .bind(booking.rental_item_id.as_uuid())
        .bind(booking.status.as_str())
        .bind(booking.start_date)
        .bind(booking.end_date)
        .bind(booking.total_days)
        .bind(booking.daily_rate.cents())
        .bind(booking.subtotal.cents())
        .bind(booking.service_fee.cents())
        .bind(booking.security_deposit.cents())
        .bind(booking.total_amount.cents())
        .bind(booking.cancelled_by.map(|u| u.as_uuid()))
        .bind(&booking.cancellation_reason)
        .bind(&booking.payment_id)
        .bind(booking.payment_status.map(|s| s.as_str()))
        .bind(&booking.pickup_address)
        .bind(&booking.pickup_notes)
        .bind(booking.pickup_time)
        .bind(&booking.return_address)
        .bind(&booking.return_notes)
        .bind(booking.return_time)
        .bind(booking.agreement_signed)
        .bind(&booking.agreement_url)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .bind(booking.version)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("bookings_pkey")
            {
                return StoreError::Duplicate(format!("booking {}", booking.id));
            }
            StoreError::Database(e)
        })?;

        Self::insert_outbox(&mut tx, outbox).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update(
        &self,
        booking: &Booking,
        expected_version: i64,
        outbox: &[OutboxRecord],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE bookings SET
                status = $3,
                cancelled_by = $4,
                cancellation_reason = $5,
                payment_id = $6,
                payment_status = $7,
                pickup_address = $8,
                pickup_notes = $9,
                pickup_time = $10,
                return_address = $11,
                return_notes = $12,
                return_time = $13,
                agreement_signed = $14,
                agreement_url = $15,
                updated_at = $16,
                version = $17
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(booking.id.as_uuid())
        .bind(expected_version)
        .bind(booking.status.as_str())
        .bind(booking.cancelled_by.map(|u| u.as_uuid()))
        .bind(&booking.cancellation_reason)
        .bind(&booking.payment_id)
        .bind(booking.payment_status.map(|s| s.as_str()))
        .bind(&booking.pickup_address)
        .bind(&booking.pickup_notes)
        .bind(booking.pickup_time)
        .bind(&booking.return_address)
        .bind(&booking.return_notes)
        .bind(booking.return_time)
        .bind(booking.agreement_signed)
        .bind(&booking.agreement_url)
        .bind(booking.updated_at)
        .bind(booking.version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let actual: Option<i64> =
                sqlx::query_scalar("SELECT version FROM bookings WHERE id = $1")
                    .bind(booking.id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;

            return Err(match actual {
                Some(actual) => StoreError::ConcurrencyConflict {
                    booking_id: booking.id,
                    expected: expected_version,
                    actual,
                },
                None => StoreError::Missing(format!("booking {}", booking.id)),
            });
        }

        Self::insert_outbox(&mut tx, outbox).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_booking).transpose()
    }

    async fn list_by_renter(
        &self,
        renter_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Booking>, StoreError> {
        self.list_by_column("renter_id", renter_id, page).await
    }

    async fn list_by_owner(
        &self,
        owner_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Booking>, StoreError> {
        self.list_by_column("owner_id", owner_id, page).await
    }
}

/// How long a relay owns the records it fetched before another may retry them.
const OUTBOX_CLAIM_LEASE: Duration = Duration::from_secs(30);

fn outbox_error(e: impl std::fmt::Display) -> ChannelError {
    ChannelError::Outbox(e.to_string())
}

#[async_trait]
impl Outbox for PostgresBookingStore {
    async fn fetch_pending(
        &self,
        limit: usize,
        max_attempts: u32,
    ) -> event_bus::Result<Vec<OutboxRecord>> {
        // Claimed rows are skipped by other relays until the lease runs out.
        let rows = sqlx::query(
            r#"
            WITH claimed AS (
                SELECT event_id FROM booking_outbox
                WHERE published_at IS NULL AND attempts < $1
                  AND (claimed_until IS NULL OR claimed_until < NOW())
                ORDER BY created_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE booking_outbox o
            SET claimed_until = NOW() + make_interval(secs => $3)
            FROM claimed
            WHERE o.event_id = claimed.event_id
            RETURNING o.event_id, o.exchange, o.envelope, o.attempts, o.last_error,
                      o.created_at, o.published_at
            "#,
        )
        .bind(i32::try_from(max_attempts).unwrap_or(i32::MAX))
        .bind(limit as i64)
        .bind(OUTBOX_CLAIM_LEASE.as_secs_f64())
        .fetch_all(&self.pool)
        .await
        .map_err(outbox_error)?;

        let mut records = rows
            .into_iter()
            .map(|row| Self::row_to_outbox_record(row).map_err(outbox_error))
            .collect::<event_bus::Result<Vec<_>>>()?;
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn mark_published(&self, event_ids: &[EventId]) -> event_bus::Result<()> {
        let ids: Vec<Uuid> = event_ids.iter().map(|id| id.as_uuid()).collect();
        sqlx::query("UPDATE booking_outbox SET published_at = NOW() WHERE event_id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(outbox_error)?;
        Ok(())
    }

    async fn mark_failed(&self, event_id: EventId, error: &str) -> event_bus::Result<()> {
        sqlx::query(
            r#"
            UPDATE booking_outbox
            SET attempts = attempts + 1, last_error = $2, claimed_until = NULL
            WHERE event_id = $1
            "#,
        )
        .bind(event_id.as_uuid())
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(outbox_error)?;
        Ok(())
    }
}
