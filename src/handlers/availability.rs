use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::{parse_date, Slot};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub date: String,
    pub service_type: Option<String>,
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    date: NaiveDate,
    service_type: Option<String>,
    slots: Vec<Slot>,
}

// GET /api/availability?date=&service_type=
pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let date = parse_date(&query.date).map_err(|e| AppError::Validation(e.to_string()))?;
    let service_type = query
        .service_type
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let slots = state.coordinator.availability(date, service_type.as_deref())?;

    Ok(Json(AvailabilityResponse {
        date,
        service_type,
        slots,
    }))
}
