use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::errors::AppError;
use crate::models::{Job, Quote};
use crate::state::AppState;

// POST /api/quotes/:id/accept
pub async fn accept_quote(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Job>), AppError> {
    let job = state.coordinator.accept_quote(&id)?;
    Ok((StatusCode::CREATED, Json(job)))
}

// POST /api/quotes/:id/withdraw
pub async fn withdraw_quote(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Quote>, AppError> {
    Ok(Json(state.coordinator.withdraw_quote(&id)?))
}
