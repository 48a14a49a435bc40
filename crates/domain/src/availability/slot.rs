use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use common::{BookingId, ItemId, SlotId};
use serde::{Deserialize, Serialize};

use super::AvailabilityError;

/// Availability state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    /// Released; does not block other slots.
    Available,
    /// Reserved for a booking.
    Booked,
    /// Held by the owner for upkeep.
    Maintenance,
    /// Held by the owner for any other reason.
    Blocked,
}

impl SlotStatus {
    /// Every status except `Available` occupies its dates.
    pub fn is_blocking(&self) -> bool {
        !matches!(self, SlotStatus::Available)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Available => "available",
            SlotStatus::Booked => "booked",
            SlotStatus::Maintenance => "maintenance",
            SlotStatus::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SlotStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(SlotStatus::Available),
            "booked" => Ok(SlotStatus::Booked),
            "maintenance" => Ok(SlotStatus::Maintenance),
            "blocked" => Ok(SlotStatus::Blocked),
            other => Err(format!("unknown slot status: {other}")),
        }
    }
}

/// Half-open day range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Builds a range from caller-supplied dates.
    ///
    /// `end == start` is read as a single day, `[start, start + 1)`.
    /// `end < start` is rejected.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, AvailabilityError> {
        if end < start {
            return Err(AvailabilityError::InvalidDates { start, end });
        }
        let end = if end == start {
            start
                .succ_opt()
                .ok_or(AvailabilityError::InvalidDates { start, end })?
        } else {
            end
        };
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Exclusive end.
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// Two half-open ranges overlap iff each starts before the other ends.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// A date range on an item with its availability state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub id: SlotId,
    pub rental_item_id: ItemId,
    pub start_date: NaiveDate,
    /// Exclusive.
    pub end_date: NaiveDate,
    pub status: SlotStatus,
    pub booking_id: Option<BookingId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AvailabilitySlot {
    pub fn new(
        rental_item_id: ItemId,
        range: DateRange,
        status: SlotStatus,
        booking_id: Option<BookingId>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SlotId::new(),
            rental_item_id,
            start_date: range.start(),
            end_date: range.end(),
            status,
            booking_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.start_date,
            end: self.end_date,
        }
    }

    /// True if this slot occupies any day of `range`.
    pub fn conflicts_with(&self, range: &DateRange) -> bool {
        self.status.is_blocking() && self.range().overlaps(range)
    }
}
