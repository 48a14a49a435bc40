use async_trait::async_trait;
use common::{NotificationId, Page, PageRequest, UserId};
use event_bus::EventId;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{Notification, NotificationError, NotificationRepository, Result};

const NOTIFICATION_COLUMNS: &str = r#"
    id, user_id, notification_type, title, message, channel, priority, status,
    action_url, source_event_id, sent_at, read_at, created_at
"#;

/// PostgreSQL-backed notification store.
#[derive(Clone)]
pub struct PostgresNotificationStore {
    pool: PgPool,
}

impl PostgresNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_notification(row: PgRow) -> Result<Notification> {
        let channel: String = row.try_get("channel")?;
        let priority: String = row.try_get("priority")?;
        let status: String = row.try_get("status")?;

        Ok(Notification {
            id: NotificationId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            notification_type: row.try_get("notification_type")?,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            channel: channel.parse().map_err(NotificationError::Corrupt)?,
            priority: priority.parse().map_err(NotificationError::Corrupt)?,
            status: status.parse().map_err(NotificationError::Corrupt)?,
            action_url: row.try_get("action_url")?,
            source_event_id: row
                .try_get::<Option<Uuid>, _>("source_event_id")?
                .map(EventId::from_uuid),
            sent_at: row.try_get("sent_at")?,
            read_at: row.try_get("read_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl NotificationRepository for PostgresNotificationStore {
    async fn insert(&self, notification: &Notification) -> Result<bool> {
        let result = sqlx::query(&format!(
            "INSERT INTO notifications ({NOTIFICATION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (source_event_id, user_id) WHERE source_event_id IS NOT NULL DO NOTHING"
        ))
        .bind(notification.id.as_uuid())
        .bind(notification.user_id.as_uuid())
        .bind(&notification.notification_type)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.channel.as_str())
        .bind(notification.priority.as_str())
        .bind(notification.status.as_str())
        .bind(&notification.action_url)
        .bind(notification.source_event_id.map(|id| id.as_uuid()))
        .bind(notification.sent_at)
        .bind(notification.read_at)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_by_id(&self, id: NotificationId) -> Result<Option<Notification>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_notification).transpose()
    }

    async fn list_by_user(&self, user_id: UserId, page: PageRequest) -> Result<Page<Notification>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(user_id.as_uuid())
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(Self::row_to_notification)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            total: usize::try_from(total).unwrap_or_default(),
        })
    }

    async fn unread_count(&self, user_id: UserId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND status <> 'read'",
        )
        .bind(user_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn mark_read(&self, id: NotificationId) -> Result<Notification> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "UPDATE notifications SET \
             read_at = COALESCE(read_at, NOW()), status = 'read' \
             WHERE id = $1 RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_notification)
            .transpose()?
            .ok_or(NotificationError::NotFound(id))
    }
}
