//! Notification dispatcher for booking events.
//!
//! This crate provides:
//! - the [`Notification`] model and its [`NotificationRepository`] stores
//! - [`resolve_target`], mapping a booking snapshot to who gets told what
//! - [`NotificationDispatcher`], the event consumer that turns booking events
//!   into in-app notifications, at most once per event and recipient
//! - [`NotificationService`] for direct sends and the user-facing queries

pub mod dispatcher;
pub mod error;
pub mod notification;
pub mod postgres;
pub mod repository;
pub mod service;
pub mod target;

pub use dispatcher::{NOTIFICATION_BINDING, NOTIFICATION_QUEUE, NotificationDispatcher};
pub use error::{NotificationError, Result};
pub use notification::{
    Notification, NotificationChannel, NotificationPriority, NotificationStatus,
    BOOKING_NOTIFICATION_TYPE,
};
pub use postgres::PostgresNotificationStore;
pub use repository::{InMemoryNotificationStore, NotificationRepository};
pub use service::{NotificationService, SendNotification};
pub use target::{BookingSnapshot, NotificationTarget, resolve_target};
