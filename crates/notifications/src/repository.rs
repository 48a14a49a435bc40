use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{NotificationId, Page, PageRequest, UserId};
use tokio::sync::RwLock;

use crate::{Notification, NotificationError, Result};

/// Persistence for notifications.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Stores a notification.
    ///
    /// Returns `false` without storing anything when a notification for the
    /// same source event and user already exists.
    async fn insert(&self, notification: &Notification) -> Result<bool>;

    async fn find_by_id(&self, id: NotificationId) -> Result<Option<Notification>>;

    /// Notifications of a user, newest first.
    async fn list_by_user(&self, user_id: UserId, page: PageRequest) -> Result<Page<Notification>>;

    /// Number of the user's notifications not yet read.
    async fn unread_count(&self, user_id: UserId) -> Result<u64>;

    /// Marks a notification read and returns it.
    async fn mark_read(&self, id: NotificationId) -> Result<Notification>;
}

/// In-memory notification store.
#[derive(Clone, Default)]
pub struct InMemoryNotificationStore {
    notifications: Arc<RwLock<HashMap<NotificationId, Notification>>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.notifications.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Every stored notification for a user, in no particular order.
    pub async fn for_user(&self, user_id: UserId) -> Vec<Notification> {
        self.notifications
            .read()
            .await
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationStore {
    async fn insert(&self, notification: &Notification) -> Result<bool> {
        let mut notifications = self.notifications.write().await;
        if notifications
            .values()
            .any(|n| n.is_same_delivery(notification))
        {
            return Ok(false);
        }
        notifications.insert(notification.id, notification.clone());
        Ok(true)
    }

    async fn find_by_id(&self, id: NotificationId) -> Result<Option<Notification>> {
        Ok(self.notifications.read().await.get(&id).cloned())
    }

    async fn list_by_user(&self, user_id: UserId, page: PageRequest) -> Result<Page<Notification>> {
        let mut matching = self.for_user(user_id).await;
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.id.as_uuid().cmp(&a.id.as_uuid()))
        });
        Ok(Page::from_sorted(matching, page))
    }

    async fn unread_count(&self, user_id: UserId) -> Result<u64> {
        let notifications = self.notifications.read().await;
        let count = notifications
            .values()
            .filter(|n| n.user_id == user_id && !n.status.is_read())
            .count();
        Ok(count as u64)
    }

    async fn mark_read(&self, id: NotificationId) -> Result<Notification> {
        let mut notifications = self.notifications.write().await;
        let notification = notifications
            .get_mut(&id)
            .ok_or(NotificationError::NotFound(id))?;
        notification.mark_read(Utc::now());
        Ok(notification.clone())
    }
}

#[cfg(test)]
mod tests {
    use event_bus::EventId;

    use super::*;
    use crate::NotificationChannel;

    fn notification(user: UserId) -> Notification {
        Notification::new(user, "booking", "Title", "Message", NotificationChannel::InApp)
    }

    #[tokio::test]
    async fn duplicate_source_event_is_skipped() {
        let store = InMemoryNotificationStore::new();
        let user = UserId::new();
        let event = EventId::new();

        assert!(store.insert(&notification(user).with_source_event(event)).await.unwrap());
        assert!(!store.insert(&notification(user).with_source_event(event)).await.unwrap());
        assert!(store
            .insert(&notification(UserId::new()).with_source_event(event))
            .await
            .unwrap());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn unread_count_drops_after_mark_read() {
        let store = InMemoryNotificationStore::new();
        let user = UserId::new();
        let first = notification(user);
        store.insert(&first).await.unwrap();
        store.insert(&notification(user)).await.unwrap();
        store.insert(&notification(UserId::new())).await.unwrap();

        assert_eq!(store.unread_count(user).await.unwrap(), 2);
        let read = store.mark_read(first.id).await.unwrap();
        assert!(read.read_at.is_some());
        assert_eq!(store.unread_count(user).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn mark_read_unknown_is_not_found() {
        let store = InMemoryNotificationStore::new();
        assert!(matches!(
            store.mark_read(NotificationId::new()).await,
            Err(NotificationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_by_user_is_paged() {
        let store = InMemoryNotificationStore::new();
        let user = UserId::new();
        for _ in 0..3 {
            store.insert(&notification(user)).await.unwrap();
        }

        let page = store
            .list_by_user(user, PageRequest::new(Some(2), Some(2)))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 1);
    }
}
