use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::{parse_date, parse_time, Booking, CancellationReason};
use crate::state::AppState;

fn invalid(e: anyhow::Error) -> AppError {
    AppError::Validation(e.to_string())
}

// POST /api/bookings
#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub customer_id: String,
    pub date: String,
    pub start_time: String,
    pub service_type: String,
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let date = parse_date(&body.date).map_err(invalid)?;
    let start_time = parse_time(&body.start_time).map_err(invalid)?;

    let booking = state
        .coordinator
        .request_booking(&body.customer_id, date, start_time, &body.service_type)?;

    Ok((StatusCode::CREATED, Json(booking)))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.coordinator.get_booking(&id)?))
}

// POST /api/bookings/:id/confirm
pub async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.coordinator.confirm_booking(&id).await?))
}

// POST /api/bookings/:id/check-in
pub async fn check_in(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.coordinator.check_in(&id)?))
}

// POST /api/bookings/:id/complete
pub async fn check_out(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.coordinator.check_out(&id)?))
}

// POST /api/bookings/:id/cancel
#[derive(Deserialize, Default)]
pub struct CancelRequest {
    pub reason: Option<String>,
    pub note: Option<String>,
}

pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<Booking>, AppError> {
    let Json(body) = body.unwrap_or_default();
    let reason = match body.reason.as_deref() {
        None => CancellationReason::CustomerRequest,
        Some(raw) => CancellationReason::parse(raw)
            .ok_or_else(|| AppError::Validation(format!("unknown cancellation reason: {raw}")))?,
    };

    Ok(Json(state.coordinator.cancel_booking(&id, reason, body.note)?))
}

// POST /api/bookings/:id/reschedule
#[derive(Deserialize)]
pub struct RescheduleRequest {
    pub date: String,
    pub start_time: String,
}

pub async fn reschedule_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<RescheduleRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let date = parse_date(&body.date).map_err(invalid)?;
    let start_time = parse_time(&body.start_time).map_err(invalid)?;

    let replacement = state.coordinator.reschedule_booking(&id, date, start_time)?;
    Ok((StatusCode::CREATED, Json(replacement)))
}
