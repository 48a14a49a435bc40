//! Notification error types.

use common::NotificationId;
use thiserror::Error;

/// Errors that can occur while storing or querying notifications.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// No notification exists with this id.
    #[error("Notification not found: {0}")]
    NotFound(NotificationId),

    /// A requested notification is missing a required field.
    #[error("Invalid notification: {0}")]
    Invalid(&'static str),

    /// The event payload is not a booking snapshot.
    #[error("Malformed booking event: {0}")]
    Payload(#[from] event_bus::ChannelError),

    /// A stored row could not be decoded.
    #[error("Corrupt notification row: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for notification operations.
pub type Result<T> = std::result::Result<T, NotificationError>;
