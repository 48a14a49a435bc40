//! Booking entity.

use chrono::{DateTime, NaiveDate, Utc};
use common::{BookingId, ItemId, UserId};
use serde::{Deserialize, Serialize};

use super::{
    BookingError, BookingEvent, BookingEventKind, BookingStatus, BookingUpdate, CreateBooking,
    PaymentStatus,
};
use crate::money::{Money, Pricing};

/// A rental of one item by one renter for a date range.
///
/// Every status change goes through a method on this type, which validates
/// the actor and the current status and returns the event to publish.
/// `version` is bumped by the service on each persisted change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    /// Human-readable reference, `BK` + creation date + 4 hex chars.
    pub booking_number: String,
    pub renter_id: UserId,
    pub owner_id: UserId,
    pub rental_item_id: ItemId,
    pub status: BookingStatus,

    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_days: i64,
    pub daily_rate: Money,
    pub subtotal: Money,
    pub service_fee: Money,
    pub security_deposit: Money,
    pub total_amount: Money,

    pub cancelled_by: Option<UserId>,
    pub cancellation_reason: Option<String>,

    pub payment_id: Option<String>,
    pub payment_status: Option<PaymentStatus>,

    pub pickup_address: Option<String>,
    pub pickup_notes: Option<String>,
    pub pickup_time: Option<DateTime<Utc>>,
    pub return_address: Option<String>,
    pub return_notes: Option<String>,
    pub return_time: Option<DateTime<Utc>>,

    pub agreement_signed: bool,
    pub agreement_url: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl Booking {
    /// Prices and creates a pending booking.
    pub fn create(
        cmd: &CreateBooking,
        now: DateTime<Utc>,
    ) -> Result<(Self, BookingEvent), BookingError> {
        let pricing = Pricing::calculate(
            cmd.start_date,
            cmd.end_date,
            cmd.daily_rate,
            cmd.security_deposit,
        )?;

        let booking = Self {
            id: cmd.booking_id,
            booking_number: booking_number(cmd.booking_id, now),
            renter_id: cmd.renter_id,
            owner_id: cmd.owner_id,
            rental_item_id: cmd.rental_item_id,
            status: BookingStatus::Pending,
            start_date: cmd.start_date,
            end_date: cmd.end_date,
            total_days: pricing.total_days,
            daily_rate: pricing.daily_rate,
            subtotal: pricing.subtotal,
            service_fee: pricing.service_fee,
            security_deposit: pricing.security_deposit,
            total_amount: pricing.total_amount,
            cancelled_by: None,
            cancellation_reason: None,
            payment_id: None,
            payment_status: None,
            pickup_address: None,
            pickup_notes: None,
            pickup_time: None,
            return_address: None,
            return_notes: None,
            return_time: None,
            agreement_signed: false,
            agreement_url: None,
            created_at: now,
            updated_at: now,
            version: 1,
        };

        let event = BookingEvent::new(BookingEventKind::Created, &booking);
        Ok((booking, event))
    }

    /// Returns true if the user is the renter or the owner.
    pub fn is_party(&self, user_id: UserId) -> bool {
        user_id == self.renter_id || user_id == self.owner_id
    }

    /// Owner accepts the request.
    pub fn confirm(
        &mut self,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<BookingEvent, BookingError> {
        self.require_owner(actor, "confirm")?;
        if !self.status.can_confirm() {
            return Err(BookingError::InvalidStatus {
                current: self.status,
                action: "confirm",
            });
        }

        self.transition(BookingStatus::Confirmed, now);
        Ok(BookingEvent::new(BookingEventKind::Confirmed, self))
    }

    /// Renter or owner withdraws from the booking.
    pub fn cancel(
        &mut self,
        actor: UserId,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<BookingEvent, BookingError> {
        if !self.is_party(actor) {
            return Err(BookingError::Unauthorized {
                actor,
                action: "cancel",
            });
        }
        match self.status {
            BookingStatus::Cancelled => return Err(BookingError::AlreadyCancelled),
            status if !status.can_cancel() => {
                return Err(BookingError::CannotCancel { current: status });
            }
            _ => {}
        }

        self.cancelled_by = Some(actor);
        self.cancellation_reason = Some(reason.into());
        self.transition(BookingStatus::Cancelled, now);
        Ok(BookingEvent::new(BookingEventKind::Cancelled, self))
    }

    /// Owner hands the item over. Needs a signed agreement and a completed payment.
    pub fn activate(
        &mut self,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<BookingEvent, BookingError> {
        self.require_owner(actor, "activate")?;
        if !self.status.can_activate() {
            return Err(BookingError::InvalidStatus {
                current: self.status,
                action: "activate",
            });
        }
        if !self.agreement_signed {
            return Err(BookingError::AgreementNotSigned);
        }
        if self.payment_status != Some(PaymentStatus::Completed) {
            return Err(BookingError::PaymentNotCompleted);
        }

        self.transition(BookingStatus::Active, now);
        Ok(BookingEvent::new(BookingEventKind::Activated, self))
    }

    /// Owner records the item's return.
    pub fn complete(
        &mut self,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<BookingEvent, BookingError> {
        self.require_owner(actor, "complete")?;
        if !self.status.can_complete() {
            return Err(BookingError::InvalidStatus {
                current: self.status,
                action: "complete",
            });
        }

        self.transition(BookingStatus::Completed, now);
        Ok(BookingEvent::new(BookingEventKind::Completed, self))
    }

    /// Stores the payment outcome. Does not change the status.
    pub fn record_payment(
        &mut self,
        payment_id: impl Into<String>,
        payment_status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        if self.status.is_terminal() {
            return Err(BookingError::InvalidStatus {
                current: self.status,
                action: "record payment for",
            });
        }

        self.payment_id = Some(payment_id.into());
        self.payment_status = Some(payment_status);
        self.updated_at = now;
        Ok(())
    }

    /// Applies logistics and agreement changes.
    pub fn apply_update(
        &mut self,
        actor: UserId,
        update: BookingUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        if !self.is_party(actor) {
            return Err(BookingError::Unauthorized {
                actor,
                action: "update",
            });
        }
        if self.status.is_terminal() {
            return Err(BookingError::InvalidStatus {
                current: self.status,
                action: "update",
            });
        }

        let BookingUpdate {
            pickup_address,
            pickup_notes,
            pickup_time,
            return_address,
            return_notes,
            return_time,
            agreement_signed,
            agreement_url,
        } = update;

        if pickup_address.is_some() {
            self.pickup_address = pickup_address;
        }
        if pickup_notes.is_some() {
            self.pickup_notes = pickup_notes;
        }
        if pickup_time.is_some() {
            self.pickup_time = pickup_time;
        }
        if return_address.is_some() {
            self.return_address = return_address;
        }
        if return_notes.is_some() {
            self.return_notes = return_notes;
        }
        if return_time.is_some() {
            self.return_time = return_time;
        }
        if let Some(signed) = agreement_signed {
            self.agreement_signed = signed;
        }
        if agreement_url.is_some() {
            self.agreement_url = agreement_url;
        }
        self.updated_at = now;
        Ok(())
    }

    fn require_owner(&self, actor: UserId, action: &'static str) -> Result<(), BookingError> {
        if actor != self.owner_id {
            return Err(BookingError::Unauthorized { actor, action });
        }
        Ok(())
    }

    fn transition(&mut self, status: BookingStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

fn booking_number(id: BookingId, now: DateTime<Utc>) -> String {
    let suffix: String = id.as_uuid().simple().to_string().chars().take(4).collect();
    format!("BK{}{}", now.format("%Y%m%d"), suffix.to_uppercase())
}
