//! Booking lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{BookingId, PageRequest, UserId};
use domain::{
    ActivateBooking, Booking, BookingUpdate, CancelBooking, CompleteBooking, ConfirmBooking,
    CreateBooking, PaymentStatus, RecordPayment, UpdateBooking,
};
use serde::{Deserialize, Serialize};

use super::{parse_date, parse_id, parse_money, require};
use crate::error::ApiError;
use crate::state::{AppState, Backend};

// -- Request types --

#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub renter_id: String,
    pub owner_id: String,
    pub rental_item_id: String,
    pub start_date: String,
    pub end_date: String,
    pub daily_rate: f64,
    #[serde(default)]
    pub security_deposit: f64,
}

#[derive(Debug, Deserialize)]
pub struct BookingQuery {
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenterQuery {
    pub renter_id: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub owner_id: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// Body shared by the owner-only transitions.
#[derive(Deserialize)]
pub struct OwnerActionRequest {
    pub booking_id: String,
    pub owner_id: String,
}

#[derive(Deserialize)]
pub struct CancelBookingRequest {
    pub booking_id: String,
    pub user_id: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Deserialize)]
pub struct UpdateBookingRequest {
    pub booking_id: String,
    pub user_id: String,
    pub pickup_address: Option<String>,
    pub pickup_notes: Option<String>,
    pub pickup_time: Option<DateTime<Utc>>,
    pub return_address: Option<String>,
    pub return_notes: Option<String>,
    pub return_time: Option<DateTime<Utc>>,
    pub agreement_signed: Option<bool>,
    pub agreement_url: Option<String>,
}

#[derive(Deserialize)]
pub struct RecordPaymentRequest {
    pub booking_id: String,
    pub payment_id: String,
    pub payment_status: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct BookingCreatedResponse {
    pub id: String,
    pub booking_number: String,
    pub status: String,
    pub total_amount: f64,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Serialize)]
pub struct BookingResponse {
    pub id: String,
    pub booking_number: String,
    pub renter_id: String,
    pub owner_id: String,
    pub rental_item_id: String,
    pub status: String,
    pub start_date: String,
    pub end_date: String,
    pub total_days: i64,
    pub daily_rate: f64,
    pub subtotal: f64,
    pub service_fee: f64,
    pub security_deposit: f64,
    pub total_amount: f64,
    pub cancelled_by: Option<String>,
    pub cancellation_reason: Option<String>,
    pub payment_id: Option<String>,
    pub payment_status: Option<String>,
    pub pickup_address: Option<String>,
    pub pickup_notes: Option<String>,
    pub pickup_time: Option<String>,
    pub return_address: Option<String>,
    pub return_notes: Option<String>,
    pub return_time: Option<String>,
    pub agreement_signed: bool,
    pub agreement_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id.to_string(),
            booking_number: b.booking_number,
            renter_id: b.renter_id.to_string(),
            owner_id: b.owner_id.to_string(),
            rental_item_id: b.rental_item_id.to_string(),
            status: b.status.to_string(),
            start_date: b.start_date.to_string(),
            end_date: b.end_date.to_string(),
            total_days: b.total_days,
            daily_rate: b.daily_rate.to_major(),
            subtotal: b.subtotal.to_major(),
            service_fee: b.service_fee.to_major(),
            security_deposit: b.security_deposit.to_major(),
            total_amount: b.total_amount.to_major(),
            cancelled_by: b.cancelled_by.map(|u| u.to_string()),
            cancellation_reason: b.cancellation_reason,
            payment_id: b.payment_id,
            payment_status: b.payment_status.map(|s| s.to_string()),
            pickup_address: b.pickup_address,
            pickup_notes: b.pickup_notes,
            pickup_time: b.pickup_time.map(|t| t.to_rfc3339()),
            return_address: b.return_address,
            return_notes: b.return_notes,
            return_time: b.return_time.map(|t| t.to_rfc3339()),
            agreement_signed: b.agreement_signed,
            agreement_url: b.agreement_url,
            created_at: b.created_at.to_rfc3339(),
            updated_at: b.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct BookingListResponse {
    pub bookings: Vec<BookingResponse>,
    pub total: usize,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Serialize)]
pub struct BookingStatusResponse {
    pub id: String,
    pub status: String,
}

impl From<Booking> for BookingStatusResponse {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id.to_string(),
            status: b.status.to_string(),
        }
    }
}

// -- Handlers --

/// POST /bookings: reserve the dates and create a pending booking.
#[tracing::instrument(skip(state, req))]
pub async fn create<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingCreatedResponse>), ApiError> {
    let cmd = CreateBooking::new(
        parse_id::<UserId>("renter_id", &req.renter_id)?,
        parse_id::<UserId>("owner_id", &req.owner_id)?,
        parse_id("rental_item_id", &req.rental_item_id)?,
        parse_date("start_date", &req.start_date)?,
        parse_date("end_date", &req.end_date)?,
        parse_money("daily_rate", req.daily_rate)?,
        parse_money("security_deposit", req.security_deposit)?,
    );

    let booking = state.reservations.reserve(cmd).await?;

    let response = BookingCreatedResponse {
        id: booking.id.to_string(),
        booking_number: booking.booking_number,
        status: booking.status.to_string(),
        total_amount: booking.total_amount.to_major(),
        start_date: booking.start_date.to_string(),
        end_date: booking.end_date.to_string(),
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /bookings?id=: load a booking by ID.
#[tracing::instrument(skip(state))]
pub async fn get<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Query(query): Query<BookingQuery>,
) -> Result<Json<BookingResponse>, ApiError> {
    let booking_id: BookingId = parse_id("id", require("id", &query.id)?)?;
    let booking = state.bookings.get(booking_id).await?;
    Ok(Json(booking.into()))
}

/// GET /bookings/renter?renter_id=: bookings made by a renter, newest first.
#[tracing::instrument(skip(state))]
pub async fn list_by_renter<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Query(query): Query<RenterQuery>,
) -> Result<Json<BookingListResponse>, ApiError> {
    let renter_id = parse_id("renter_id", require("renter_id", &query.renter_id)?)?;
    let request = PageRequest::new(query.page, query.page_size);
    let page = state.bookings.list_by_renter(renter_id, request).await?;
    Ok(Json(list_response(page, request)))
}

/// GET /bookings/owner?owner_id=: bookings of an owner's items, newest first.
#[tracing::instrument(skip(state))]
pub async fn list_by_owner<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<BookingListResponse>, ApiError> {
    let owner_id = parse_id("owner_id", require("owner_id", &query.owner_id)?)?;
    let request = PageRequest::new(query.page, query.page_size);
    let page = state.bookings.list_by_owner(owner_id, request).await?;
    Ok(Json(list_response(page, request)))
}

fn list_response(page: common::Page<Booking>, request: PageRequest) -> BookingListResponse {
    BookingListResponse {
        total: page.total,
        bookings: page.items.into_iter().map(BookingResponse::from).collect(),
        page: request.page(),
        page_size: request.page_size(),
    }
}

/// POST /bookings/confirm: owner accepts a pending booking.
#[tracing::instrument(skip(state, req))]
pub async fn confirm<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Json(req): Json<OwnerActionRequest>,
) -> Result<Json<BookingStatusResponse>, ApiError> {
    let cmd = ConfirmBooking::new(
        parse_id("booking_id", &req.booking_id)?,
        parse_id("owner_id", &req.owner_id)?,
    );
    Ok(Json(state.bookings.confirm(cmd).await?.into()))
}

/// POST /bookings/cancel: renter or owner cancels; the dates are released.
#[tracing::instrument(skip(state, req))]
pub async fn cancel<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Json(req): Json<CancelBookingRequest>,
) -> Result<Json<BookingStatusResponse>, ApiError> {
    let cmd = CancelBooking::new(
        parse_id("booking_id", &req.booking_id)?,
        parse_id("user_id", &req.user_id)?,
        req.reason,
    );
    Ok(Json(state.reservations.cancel(cmd).await?.into()))
}

/// POST /bookings/activate: owner hands the item over.
#[tracing::instrument(skip(state, req))]
pub async fn activate<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Json(req): Json<OwnerActionRequest>,
) -> Result<Json<BookingStatusResponse>, ApiError> {
    let cmd = ActivateBooking::new(
        parse_id("booking_id", &req.booking_id)?,
        parse_id("owner_id", &req.owner_id)?,
    );
    Ok(Json(state.bookings.activate(cmd).await?.into()))
}

/// POST /bookings/complete: owner records the item's return.
#[tracing::instrument(skip(state, req))]
pub async fn complete<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Json(req): Json<OwnerActionRequest>,
) -> Result<Json<BookingStatusResponse>, ApiError> {
    let cmd = CompleteBooking::new(
        parse_id("booking_id", &req.booking_id)?,
        parse_id("owner_id", &req.owner_id)?,
    );
    Ok(Json(state.bookings.complete(cmd).await?.into()))
}

/// POST /bookings/update: change pickup, return or agreement details.
#[tracing::instrument(skip(state, req))]
pub async fn update<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Json(req): Json<UpdateBookingRequest>,
) -> Result<Json<BookingResponse>, ApiError> {
    let booking_id = parse_id("booking_id", &req.booking_id)?;
    let user_id = parse_id("user_id", &req.user_id)?;
    let update = BookingUpdate {
        pickup_address: req.pickup_address,
        pickup_notes: req.pickup_notes,
        pickup_time: req.pickup_time,
        return_address: req.return_address,
        return_notes: req.return_notes,
        return_time: req.return_time,
        agreement_signed: req.agreement_signed,
        agreement_url: req.agreement_url,
    };

    let booking = state
        .bookings
        .update(UpdateBooking::new(booking_id, user_id, update))
        .await?;
    Ok(Json(booking.into()))
}

/// POST /bookings/payment: record the payment service's outcome.
#[tracing::instrument(skip(state, req))]
pub async fn record_payment<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Json(req): Json<RecordPaymentRequest>,
) -> Result<Json<BookingStatusResponse>, ApiError> {
    let payment_status = req
        .payment_status
        .parse::<PaymentStatus>()
        .map_err(ApiError::BadRequest)?;
    let cmd = RecordPayment::new(
        parse_id("booking_id", &req.booking_id)?,
        req.payment_id,
        payment_status,
    );
    Ok(Json(state.bookings.record_payment(cmd).await?.into()))
}
