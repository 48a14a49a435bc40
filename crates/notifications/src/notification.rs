use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::{NotificationId, UserId};
use event_bus::EventId;
use serde::{Deserialize, Serialize};

/// Type tag for notifications produced from booking events.
pub const BOOKING_NOTIFICATION_TYPE: &str = "booking";

/// Where a notification is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Sms,
    Push,
    InApp,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::Email => "email",
            NotificationChannel::Sms => "sms",
            NotificationChannel::Push => "push",
            NotificationChannel::InApp => "in_app",
        }
    }
}

impl FromStr for NotificationChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(NotificationChannel::Email),
            "sms" => Ok(NotificationChannel::Sms),
            "push" => Ok(NotificationChannel::Push),
            "in_app" => Ok(NotificationChannel::InApp),
            other => Err(format!("unknown notification channel: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl NotificationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationPriority::Low => "low",
            NotificationPriority::Medium => "medium",
            NotificationPriority::High => "high",
        }
    }
}

impl FromStr for NotificationPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(NotificationPriority::Low),
            "medium" => Ok(NotificationPriority::Medium),
            "high" => Ok(NotificationPriority::High),
            other => Err(format!("unknown notification priority: {other}")),
        }
    }
}

/// Delivery state of a notification.
///
/// ```text
/// Pending ──► Sent ──► Read
///    │                  ▲
///    ├──► Failed        │
///    └──────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    #[default]
    Pending,
    Sent,
    Failed,
    Read,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
            NotificationStatus::Read => "read",
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, NotificationStatus::Read)
    }
}

impl FromStr for NotificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NotificationStatus::Pending),
            "sent" => Ok(NotificationStatus::Sent),
            "failed" => Ok(NotificationStatus::Failed),
            "read" => Ok(NotificationStatus::Read),
            other => Err(format!("unknown notification status: {other}")),
        }
    }
}

/// A message addressed to one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub channel: NotificationChannel,
    pub priority: NotificationPriority,
    pub status: NotificationStatus,
    pub action_url: Option<String>,
    /// Event this notification was produced from, if any. Together with
    /// `user_id` it identifies a notification across redeliveries.
    pub source_event_id: Option<EventId>,
    pub sent_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Creates a pending, medium-priority notification.
    pub fn new(
        user_id: UserId,
        notification_type: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
        channel: NotificationChannel,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            user_id,
            notification_type: notification_type.into(),
            title: title.into(),
            message: message.into(),
            channel,
            priority: NotificationPriority::default(),
            status: NotificationStatus::Pending,
            action_url: None,
            source_event_id: None,
            sent_at: None,
            read_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_source_event(mut self, event_id: EventId) -> Self {
        self.source_event_id = Some(event_id);
        self
    }

    pub fn with_action_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }

    /// Marks the notification read. Reading twice keeps the first timestamp.
    pub fn mark_read(&mut self, now: DateTime<Utc>) {
        if !self.status.is_read() {
            self.status = NotificationStatus::Read;
            self.read_at = Some(now);
        }
    }

    /// True if both notifications stem from the same event for the same user.
    pub fn is_same_delivery(&self, other: &Notification) -> bool {
        self.source_event_id.is_some()
            && self.source_event_id == other.source_event_id
            && self.user_id == other.user_id
    }
}
