//! Money and booking pricing.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::booking::BookingError;

/// Service fee charged on top of the rental subtotal, in basis points (10%).
pub const SERVICE_FEE_BASIS_POINTS: i64 = 1_000;

/// Money amount represented in cents to avoid floating point issues.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a new Money amount from cents.
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Converts a decimal amount in major units, rounding half away from zero
    /// to the nearest cent.
    ///
    /// Returns `None` for NaN, infinities and values outside the `i64` cent range.
    pub fn from_major(amount: f64) -> Option<Self> {
        let cents = (amount * 100.0).round();
        if !cents.is_finite() || cents < i64::MIN as f64 || cents > i64::MAX as f64 {
            return None;
        }
        Some(Self(cents as i64))
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in cents.
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the amount in major units, for display at the boundary.
    pub fn to_major(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies by a day count, or `None` on overflow.
    pub fn checked_times(&self, days: i64) -> Option<Money> {
        self.0.checked_mul(days).map(Money)
    }

    /// Applies a rate in basis points, rounding half-up to the cent.
    ///
    /// Only meaningful for non-negative amounts. Returns `None` on overflow.
    pub fn checked_basis_points(&self, basis_points: i64) -> Option<Money> {
        let scaled = self.0.checked_mul(basis_points)?.checked_add(5_000)?;
        Some(Money(scaled / 10_000))
    }

    /// Adds two amounts, or `None` on overflow.
    pub fn checked_add(&self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{sign}{}.{:02}", (self.0 / 100).abs(), (self.0 % 100).abs())
    }
}

/// Derived price breakdown of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pricing {
    pub total_days: i64,
    pub daily_rate: Money,
    pub subtotal: Money,
    pub service_fee: Money,
    pub security_deposit: Money,
    pub total_amount: Money,
}

impl Pricing {
    /// Prices a rental between two dates.
    ///
    /// A rental shorter than a full day is charged as one day.
    pub fn calculate(
        start: NaiveDate,
        end: NaiveDate,
        daily_rate: Money,
        security_deposit: Money,
    ) -> Result<Self, BookingError> {
        if end < start {
            return Err(BookingError::InvalidDates { start, end });
        }
        if daily_rate.is_negative() {
            return Err(BookingError::InvalidAmount {
                field: "daily_rate",
                amount: daily_rate,
            });
        }
        if security_deposit.is_negative() {
            return Err(BookingError::InvalidAmount {
                field: "security_deposit",
                amount: security_deposit,
            });
        }

        let total_days = (end - start).num_days().max(1);
        let overflow = || BookingError::InvalidAmount {
            field: "daily_rate",
            amount: daily_rate,
        };
        let subtotal = daily_rate.checked_times(total_days).ok_or_else(overflow)?;
        let service_fee = subtotal
            .checked_basis_points(SERVICE_FEE_BASIS_POINTS)
            .ok_or_else(overflow)?;
        let total_amount = subtotal
            .checked_add(service_fee)
            .and_then(|sum| sum.checked_add(security_deposit))
            .ok_or(BookingError::InvalidAmount {
                field: "security_deposit",
                amount: security_deposit,
            })?;

        Ok(Self {
            total_days,
            daily_rate,
            subtotal,
            service_fee,
            security_deposit,
            total_amount,
        })
    }
}
