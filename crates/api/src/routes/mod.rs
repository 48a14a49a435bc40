//! HTTP route handlers.

pub mod availability;
pub mod bookings;
pub mod health;
pub mod metrics;
pub mod notifications;

use chrono::NaiveDate;
use domain::Money;
use uuid::Uuid;

use crate::error::ApiError;

fn require<'a>(field: &str, value: &'a Option<String>) -> Result<&'a str, ApiError> {
    value
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest(format!("{field} is required")))
}

fn parse_id<T: From<Uuid>>(field: &str, value: &str) -> Result<T, ApiError> {
    Uuid::parse_str(value)
        .map(T::from)
        .map_err(|e| ApiError::BadRequest(format!("Invalid {field}: {e}")))
}

/// Parses a `YYYY-MM-DD` date.
fn parse_date(field: &str, value: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| ApiError::BadRequest(format!("Invalid {field}: {e}")))
}

/// Converts a decimal amount in major units to [`Money`].
fn parse_money(field: &str, amount: f64) -> Result<Money, ApiError> {
    Money::from_major(amount)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid {field}: {amount}")))
}

#[cfg(test)]
mod tests {
    use common::BookingId;

    use super::*;

    #[test]
    fn parses_ids_dates_and_amounts() {
        let id = Uuid::new_v4();
        let parsed: BookingId = parse_id("booking_id", &id.to_string()).unwrap();
        assert_eq!(parsed.as_uuid(), id);

        assert_eq!(
            parse_date("start_date", "2025-06-01").unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
        );
        assert_eq!(parse_money("daily_rate", 100.5).unwrap(), Money::from_cents(10_050));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            parse_id::<BookingId>("booking_id", "not-a-uuid"),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            parse_date("start_date", "06/01/2025"),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            parse_money("daily_rate", f64::NAN),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            require("id", &None),
            Err(ApiError::BadRequest(msg)) if msg == "id is required"
        ));
    }
}
