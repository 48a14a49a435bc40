//! Availability ledger endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use common::{ItemId, SlotId};
use domain::{AvailabilitySlot, SlotStatus};
use serde::{Deserialize, Serialize};

use super::{parse_date, parse_id, require};
use crate::error::ApiError;
use crate::state::{AppState, Backend};

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub item_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Deserialize)]
pub struct HoldDatesRequest {
    pub item_id: String,
    pub start_date: String,
    pub end_date: String,
    /// `maintenance` or `blocked`.
    pub status: String,
}

#[derive(Deserialize)]
pub struct ReleaseSlotRequest {
    pub slot_id: String,
}

#[derive(Serialize)]
pub struct SlotResponse {
    pub id: String,
    pub rental_item_id: String,
    pub start_date: String,
    pub end_date: String,
    pub status: String,
    pub booking_id: Option<String>,
}

impl From<AvailabilitySlot> for SlotResponse {
    fn from(slot: AvailabilitySlot) -> Self {
        Self {
            id: slot.id.to_string(),
            rental_item_id: slot.rental_item_id.to_string(),
            start_date: slot.start_date.to_string(),
            end_date: slot.end_date.to_string(),
            status: slot.status.to_string(),
            booking_id: slot.booking_id.map(|b| b.to_string()),
        }
    }
}

#[derive(Serialize)]
pub struct AvailabilityCheckResponse {
    pub available: bool,
}

struct Window {
    item_id: ItemId,
    start: chrono::NaiveDate,
    end: chrono::NaiveDate,
}

impl TryFrom<&AvailabilityQuery> for Window {
    type Error = ApiError;

    fn try_from(query: &AvailabilityQuery) -> Result<Self, ApiError> {
        Ok(Self {
            item_id: parse_id("item_id", require("item_id", &query.item_id)?)?,
            start: parse_date("start_date", require("start_date", &query.start_date)?)?,
            end: parse_date("end_date", require("end_date", &query.end_date)?)?,
        })
    }
}

/// GET /availability: slots of an item overlapping the window.
#[tracing::instrument(skip(state))]
pub async fn list<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Vec<SlotResponse>>, ApiError> {
    let window = Window::try_from(&query)?;
    let slots = state
        .ledger
        .list_slots(window.item_id, window.start, window.end)
        .await?;
    Ok(Json(slots.into_iter().map(SlotResponse::from).collect()))
}

/// GET /availability/check: whether the window is free.
#[tracing::instrument(skip(state))]
pub async fn check<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityCheckResponse>, ApiError> {
    let window = Window::try_from(&query)?;
    let conflict = state
        .ledger
        .check_conflict(window.item_id, window.start, window.end, None)
        .await?;
    Ok(Json(AvailabilityCheckResponse {
        available: !conflict,
    }))
}

/// POST /availability/block: owner holds dates for maintenance or personal use.
#[tracing::instrument(skip(state, req))]
pub async fn block<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Json(req): Json<HoldDatesRequest>,
) -> Result<(StatusCode, Json<SlotResponse>), ApiError> {
    let status = req
        .status
        .parse::<SlotStatus>()
        .map_err(ApiError::BadRequest)?;
    let slot = state
        .ledger
        .hold_dates(
            parse_id("item_id", &req.item_id)?,
            parse_date("start_date", &req.start_date)?,
            parse_date("end_date", &req.end_date)?,
            status,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(slot.into())))
}

/// POST /availability/release: return a held slot to available.
#[tracing::instrument(skip(state, req))]
pub async fn release<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Json(req): Json<ReleaseSlotRequest>,
) -> Result<Json<SlotResponse>, ApiError> {
    let slot_id: SlotId = parse_id("slot_id", &req.slot_id)?;
    let slot = state.ledger.release(slot_id).await?;
    Ok(Json(slot.into()))
}
