use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::db::queries::MonthlyActivity;
use crate::errors::AppError;
use crate::models::{AvailabilityRule, Booking, BookingStatus, RuleDraft};
use crate::state::AppState;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

// GET /api/admin/rules
pub async fn list_rules(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<AvailabilityRule>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    Ok(Json(state.coordinator.list_rules()?))
}

// POST /api/admin/rules
pub async fn upsert_rule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(draft): Json<RuleDraft>,
) -> Result<Json<AvailabilityRule>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    Ok(Json(state.coordinator.upsert_rule(draft)?))
}

// POST /api/admin/rules/:id/deactivate
pub async fn deactivate_rule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<AvailabilityRule>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    Ok(Json(state.coordinator.deactivate_rule(&id)?))
}

// GET /api/admin/bookings?status=&limit=
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            BookingStatus::parse(raw)
                .ok_or_else(|| AppError::Validation(format!("unknown booking status: {raw}")))?,
        ),
    };

    Ok(Json(state.coordinator.list_bookings(status, query.limit)?))
}

// GET /api/admin/activity
#[derive(Deserialize)]
pub struct ActivityQuery {
    pub months: Option<usize>,
}

pub async fn get_activity(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<MonthlyActivity>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let months = query.months.unwrap_or(6).clamp(1, 24);
    Ok(Json(state.repo.recent_activity(months)?))
}
