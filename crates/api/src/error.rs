//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{AvailabilityError, BookingError, DomainError, StoreError};
use notifications::NotificationError;
use reservation::ReservationError;

const INTERNAL_MESSAGE: &str = "Internal server error";

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Booking service error.
    Domain(DomainError),
    /// Availability ledger error.
    Availability(AvailabilityError),
    /// Reservation coordinator error.
    Reservation(ReservationError),
    /// Notification store error.
    Notification(NotificationError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Domain(err) => classified(domain_status(&err), err),
            ApiError::Availability(err) => classified(availability_status(&err), err),
            ApiError::Reservation(err) => classified(reservation_status(&err), err),
            ApiError::Notification(err) => classified(notification_status(&err), err),
            ApiError::Internal(msg) => internal(msg),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

/// `None` marks an infrastructure failure, whose detail stays in the logs.
fn classified(status: Option<StatusCode>, err: impl std::fmt::Display) -> (StatusCode, String) {
    match status {
        Some(status) => (status, err.to_string()),
        None => internal(err.to_string()),
    }
}

fn internal(detail: String) -> (StatusCode, String) {
    tracing::error!(error = %detail, "internal server error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        INTERNAL_MESSAGE.to_string(),
    )
}

fn booking_status(err: &BookingError) -> StatusCode {
    match err {
        BookingError::NotFound(_) => StatusCode::NOT_FOUND,
        BookingError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        BookingError::InvalidDates { .. } | BookingError::InvalidAmount { .. } => {
            StatusCode::BAD_REQUEST
        }
        BookingError::InvalidStatus { .. }
        | BookingError::AlreadyCancelled
        | BookingError::CannotCancel { .. }
        | BookingError::AgreementNotSigned
        | BookingError::PaymentNotCompleted => StatusCode::CONFLICT,
    }
}

fn availability_status(err: &AvailabilityError) -> Option<StatusCode> {
    match err {
        AvailabilityError::InvalidDates { .. } | AvailabilityError::InvalidHoldStatus(_) => {
            Some(StatusCode::BAD_REQUEST)
        }
        AvailabilityError::DateConflict { .. } => Some(StatusCode::CONFLICT),
        AvailabilityError::SlotNotFound(_) => Some(StatusCode::NOT_FOUND),
        AvailabilityError::Store(e) => store_status(e),
    }
}

fn store_status(err: &StoreError) -> Option<StatusCode> {
    match err {
        StoreError::ConcurrencyConflict { .. } | StoreError::Duplicate(_) => {
            Some(StatusCode::CONFLICT)
        }
        _ => None,
    }
}

fn domain_status(err: &DomainError) -> Option<StatusCode> {
    match err {
        DomainError::Booking(e) => Some(booking_status(e)),
        DomainError::Availability(e) => availability_status(e),
        DomainError::Store(e) => store_status(e),
        DomainError::Event(_) => None,
    }
}

fn reservation_status(err: &ReservationError) -> Option<StatusCode> {
    match err {
        ReservationError::Availability(e) => availability_status(e),
        ReservationError::Domain(e) => domain_status(e),
        ReservationError::CompensationFailed { .. } => None,
    }
}

fn notification_status(err: &NotificationError) -> Option<StatusCode> {
    match err {
        NotificationError::NotFound(_) => Some(StatusCode::NOT_FOUND),
        NotificationError::Invalid(_) => Some(StatusCode::BAD_REQUEST),
        _ => None,
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<AvailabilityError> for ApiError {
    fn from(err: AvailabilityError) -> Self {
        ApiError::Availability(err)
    }
}

impl From<ReservationError> for ApiError {
    fn from(err: ReservationError) -> Self {
        ApiError::Reservation(err)
    }
}

impl From<NotificationError> for ApiError {
    fn from(err: NotificationError) -> Self {
        ApiError::Notification(err)
    }
}
