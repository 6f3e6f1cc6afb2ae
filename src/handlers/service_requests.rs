use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::{NewServiceRequest, Quote, QuoteEstimate, ServiceRequest};
use crate::services::assignment::ServiceRequestDetail;
use crate::state::AppState;

// POST /api/service-requests
pub async fn create_service_request(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewServiceRequest>,
) -> Result<(StatusCode, Json<ServiceRequest>), AppError> {
    let request = state.coordinator.create_service_request(body)?;
    Ok((StatusCode::CREATED, Json(request)))
}

// GET /api/service-requests/:id
pub async fn get_service_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ServiceRequestDetail>, AppError> {
    Ok(Json(state.coordinator.get_service_request(&id)?))
}

// POST /api/service-requests/:id/cancel
pub async fn cancel_service_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ServiceRequest>, AppError> {
    Ok(Json(state.coordinator.cancel_service_request(&id)?))
}

// POST /api/service-requests/:id/quotes
#[derive(Deserialize)]
pub struct SubmitQuoteRequest {
    pub technician_id: String,
    #[serde(flatten)]
    pub estimate: QuoteEstimate,
}

pub async fn submit_quote(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<SubmitQuoteRequest>,
) -> Result<(StatusCode, Json<Quote>), AppError> {
    let quote = state
        .coordinator
        .submit_quote(&id, &body.technician_id, body.estimate)?;
    Ok((StatusCode::CREATED, Json(quote)))
}
