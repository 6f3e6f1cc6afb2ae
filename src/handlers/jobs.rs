use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::Job;
use crate::state::AppState;

// GET /api/jobs/:id
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, AppError> {
    Ok(Json(state.coordinator.get_job(&id)?))
}

// POST /api/jobs/:id/start
pub async fn start_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, AppError> {
    Ok(Json(state.coordinator.start_job(&id)?))
}

// POST /api/jobs/:id/complete
#[derive(Deserialize)]
pub struct CompleteJobRequest {
    pub actual_hours: f64,
}

pub async fn complete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<CompleteJobRequest>,
) -> Result<Json<Job>, AppError> {
    Ok(Json(state.coordinator.complete_job(&id, body.actual_hours)?))
}

// POST /api/jobs/:id/cancel
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, AppError> {
    Ok(Json(state.coordinator.cancel_job(&id)?))
}

// POST /api/jobs/:id/rate
#[derive(Deserialize)]
pub struct RateJobRequest {
    pub stars: u8,
    pub feedback: Option<String>,
}

pub async fn rate_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<RateJobRequest>,
) -> Result<StatusCode, AppError> {
    state.coordinator.rate_job(&id, body.stars, body.feedback)?;
    Ok(StatusCode::NO_CONTENT)
}
