//! Shared types for the rental booking engine.
//!
//! Every crate in the workspace identifies bookings, users, items, slots and
//! notifications through the newtypes defined here, so a renter id can never
//! be passed where an item id is expected.

mod ids;
mod pagination;

pub use ids::{BookingId, ItemId, NotificationId, SlotId, UserId};
pub use pagination::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, Page, PageRequest};
