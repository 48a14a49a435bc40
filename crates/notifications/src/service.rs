//! Notification service: event intake and user-facing queries.

use common::{NotificationId, Page, PageRequest, UserId};
use event_bus::EventEnvelope;

use crate::{
    BOOKING_NOTIFICATION_TYPE, BookingSnapshot, Notification, NotificationChannel,
    NotificationError, NotificationPriority, NotificationRepository, Result, resolve_target,
};

/// A notification requested directly rather than derived from an event.
#[derive(Debug, Clone)]
pub struct SendNotification {
    pub user_id: UserId,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub channel: NotificationChannel,
    pub priority: NotificationPriority,
    pub action_url: Option<String>,
}

/// Service for creating and querying notifications.
#[derive(Clone)]
pub struct NotificationService<R: NotificationRepository> {
    repository: R,
}

impl<R: NotificationRepository> NotificationService<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Turns a booking event into at most one notification.
    ///
    /// Returns the notification when one was created. A repeat of an event
    /// already handled returns `None`.
    #[tracing::instrument(skip(self, envelope), fields(event_id = %envelope.event_id, event_type = %envelope.event_type))]
    pub async fn handle_booking_event(
        &self,
        envelope: &EventEnvelope,
    ) -> Result<Option<Notification>> {
        let booking: BookingSnapshot = envelope.decode_payload()?;

        let Some(target) = resolve_target(&booking) else {
            tracing::debug!(status = %booking.status, "no notification for status");
            return Ok(None);
        };

        let notification = Notification::new(
            target.user_id,
            BOOKING_NOTIFICATION_TYPE,
            target.title,
            target.message,
            NotificationChannel::InApp,
        )
        .with_source_event(envelope.event_id)
        .with_action_url(format!("/bookings?id={}", booking.id));

        if !self.repository.insert(&notification).await? {
            tracing::debug!(user_id = %target.user_id, "event already notified");
            return Ok(None);
        }

        metrics::counter!("notifications_created_total").increment(1);
        tracing::info!(
            booking_id = %booking.id,
            user_id = %target.user_id,
            title = target.title,
            "notification created"
        );
        Ok(Some(notification))
    }

    /// Stores a notification that did not come from an event.
    #[tracing::instrument(skip(self, cmd), fields(user_id = %cmd.user_id, channel = cmd.channel.as_str()))]
    pub async fn send(&self, cmd: SendNotification) -> Result<Notification> {
        if cmd.notification_type.trim().is_empty() {
            return Err(NotificationError::Invalid("type is required"));
        }
        if cmd.title.trim().is_empty() {
            return Err(NotificationError::Invalid("title is required"));
        }

        let mut notification = Notification::new(
            cmd.user_id,
            cmd.notification_type,
            cmd.title,
            cmd.message,
            cmd.channel,
        );
        notification.priority = cmd.priority;
        if let Some(url) = cmd.action_url {
            notification = notification.with_action_url(url);
        }

        self.repository.insert(&notification).await?;
        metrics::counter!("notifications_created_total").increment(1);
        Ok(notification)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_by_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Notification>> {
        self.repository.list_by_user(user_id, page).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn unread_count(&self, user_id: UserId) -> Result<u64> {
        self.repository.unread_count(user_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_read(&self, id: NotificationId) -> Result<Notification> {
        self.repository.mark_read(id).await
    }
}

#[cfg(test)]
mod tests {
    use common::{BookingId, ItemId};
    use serde_json::json;

    use super::*;
    use crate::{InMemoryNotificationStore, NotificationError};

    fn booking_event(event_type: &str, status: &str, renter: UserId, owner: UserId) -> EventEnvelope {
        EventEnvelope::builder()
            .event_type(event_type)
            .payload_raw(json!({
                "id": BookingId::new(),
                "renter_id": renter,
                "owner_id": owner,
                "rental_item_id": ItemId::new(),
                "status": status,
            }))
            .build()
            .unwrap()
    }

    fn create_service() -> NotificationService<InMemoryNotificationStore> {
        NotificationService::new(InMemoryNotificationStore::new())
    }

    #[tokio::test]
    async fn created_event_notifies_owner() {
        let service = create_service();
        let owner = UserId::new();
        let event = booking_event("booking.created", "pending", UserId::new(), owner);

        let notification = service.handle_booking_event(&event).await.unwrap().unwrap();
        assert_eq!(notification.user_id, owner);
        assert_eq!(notification.title, "New Booking Request");
        assert_eq!(notification.channel, NotificationChannel::InApp);
        assert_eq!(notification.source_event_id, Some(event.event_id));
        let booking_id = event.payload["id"].as_str().unwrap();
        assert_eq!(
            notification.action_url,
            Some(format!("/bookings?id={booking_id}"))
        );
    }

    #[tokio::test]
    async fn repeated_event_is_notified_once() {
        let service = create_service();
        let renter = UserId::new();
        let event = booking_event("booking.confirmed", "confirmed", renter, UserId::new());

        assert!(service.handle_booking_event(&event).await.unwrap().is_some());
        assert!(service.handle_booking_event(&event).await.unwrap().is_none());
        assert_eq!(service.unread_count(renter).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn completed_event_is_ignored() {
        let service = create_service();
        let event = booking_event("booking.completed", "completed", UserId::new(), UserId::new());
        assert!(service.handle_booking_event(&event).await.unwrap().is_none());
        assert!(service.repository().is_empty().await);
    }

    #[tokio::test]
    async fn malformed_payload_is_an_error() {
        let service = create_service();
        let event = EventEnvelope::builder()
            .event_type("booking.created")
            .payload_raw(json!({"status": "pending"}))
            .build()
            .unwrap();
        assert!(matches!(
            service.handle_booking_event(&event).await,
            Err(NotificationError::Payload(_))
        ));
    }

    fn welcome(user: UserId) -> SendNotification {
        SendNotification {
            user_id: user,
            notification_type: "system".to_string(),
            title: "Welcome".to_string(),
            message: "Hello".to_string(),
            channel: NotificationChannel::Email,
            priority: NotificationPriority::High,
            action_url: Some("/profile".to_string()),
        }
    }

    #[tokio::test]
    async fn send_rejects_blank_title() {
        let service = create_service();
        let mut cmd = welcome(UserId::new());
        cmd.title = "  ".to_string();

        assert!(matches!(
            service.send(cmd).await,
            Err(NotificationError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn send_and_read_flow() {
        let service = create_service();
        let user = UserId::new();
        let sent = service.send(welcome(user)).await.unwrap();
        assert_eq!(sent.priority, NotificationPriority::High);
        assert_eq!(sent.action_url.as_deref(), Some("/profile"));

        assert_eq!(service.unread_count(user).await.unwrap(), 1);
        service.mark_read(sent.id).await.unwrap();
        assert_eq!(service.unread_count(user).await.unwrap(), 0);

        let page = service
            .list_by_user(user, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert!(page.items[0].status.is_read());
    }
}
