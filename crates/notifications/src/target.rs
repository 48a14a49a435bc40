//! Who hears about a booking change, and what they are told.

use common::{BookingId, ItemId, UserId};
use domain::BookingStatus;
use serde::Deserialize;

/// The part of a booking event payload the dispatcher needs.
///
/// Other snapshot fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BookingSnapshot {
    pub id: BookingId,
    pub renter_id: UserId,
    pub owner_id: UserId,
    pub rental_item_id: ItemId,
    pub status: BookingStatus,
}

/// Recipient and content of the notification a booking status produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationTarget {
    pub user_id: UserId,
    pub title: &'static str,
    pub message: &'static str,
}

/// Maps a booking snapshot to its notification.
///
/// | status    | recipient | title                 |
/// |-----------|-----------|-----------------------|
/// | pending   | owner     | New Booking Request   |
/// | confirmed | renter    | Booking Confirmed     |
/// | cancelled | renter    | Booking Cancelled     |
///
/// Every other status produces nothing.
pub fn resolve_target(booking: &BookingSnapshot) -> Option<NotificationTarget> {
    match booking.status {
        BookingStatus::Pending => Some(NotificationTarget {
            user_id: booking.owner_id,
            title: "New Booking Request",
            message: "You have a new booking request for your item.",
        }),
        BookingStatus::Confirmed => Some(NotificationTarget {
            user_id: booking.renter_id,
            title: "Booking Confirmed",
            message: "Your booking request has been confirmed by the owner.",
        }),
        BookingStatus::Cancelled => Some(NotificationTarget {
            user_id: booking.renter_id,
            title: "Booking Cancelled",
            message: "Your booking has been cancelled.",
        }),
        BookingStatus::Active | BookingStatus::Completed => None,
    }
}
