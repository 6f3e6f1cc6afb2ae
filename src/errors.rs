use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::NaiveDate;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("slot {date} {start_time} for {service_type} is no longer available")]
    SlotNoLongerAvailable {
        date: NaiveDate,
        start_time: String,
        service_type: String,
    },

    #[error("invalid {entity} transition: {current} -> {requested}")]
    InvalidTransition {
        entity: &'static str,
        current: &'static str,
        requested: &'static str,
    },

    #[error("technician {technician_id} already has an open quote on this request")]
    DuplicateQuote { technician_id: String },

    #[error("a quote on service request {service_request_id} is already accepted")]
    AlreadyAccepted { service_request_id: String },

    #[error("job {job_id} has already been rated")]
    AlreadyRated { job_id: String },

    #[error("billing provider declined booking {booking_id}: {reason}")]
    BillingConfirmationFailed { booking_id: String, reason: String },

    #[error("payment for booking {booking_id} is already being processed")]
    PaymentInProgress { booking_id: String },

    #[error("billing provider error: {0}")]
    Billing(String),

    #[error("service request {id} is {status} and no longer accepts quotes")]
    RequestClosed { id: String, status: &'static str },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl AppError {
    /// Stable discriminator for clients that render recovery hints.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::SlotNoLongerAvailable { .. } => "slot_no_longer_available",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::DuplicateQuote { .. } => "duplicate_quote",
            AppError::AlreadyAccepted { .. } => "already_accepted",
            AppError::AlreadyRated { .. } => "already_rated",
            AppError::BillingConfirmationFailed { .. } => "billing_confirmation_failed",
            AppError::PaymentInProgress { .. } => "payment_in_progress",
            AppError::Billing(_) => "billing_unavailable",
            AppError::RequestClosed { .. } => "request_closed",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized => "unauthorized",
            AppError::Database(_) | AppError::Storage(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::SlotNoLongerAvailable { .. }
            | AppError::InvalidTransition { .. }
            | AppError::DuplicateQuote { .. }
            | AppError::AlreadyAccepted { .. }
            | AppError::AlreadyRated { .. }
            | AppError::RequestClosed { .. }
            | AppError::PaymentInProgress { .. } => StatusCode::CONFLICT,
            AppError::BillingConfirmationFailed { .. } => StatusCode::PAYMENT_REQUIRED,
            AppError::Billing(_) => StatusCode::BAD_GATEWAY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Database(_) | AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let mut body = serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        match &self {
            AppError::InvalidTransition {
                current, requested, ..
            } => {
                body["current"] = serde_json::json!(current);
                body["requested"] = serde_json::json!(requested);
            }
            AppError::SlotNoLongerAvailable {
                date, start_time, ..
            } => {
                body["date"] = serde_json::json!(date);
                body["start_time"] = serde_json::json!(start_time);
            }
            _ => {}
        }

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_response_carries_states() {
        let err = AppError::InvalidTransition {
            entity: "booking",
            current: "cancelled",
            requested: "confirmed",
        };
        assert_eq!(err.code(), "invalid_transition");
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(
            err.to_string(),
            "invalid booking transition: cancelled -> confirmed"
        );
    }

    #[test]
    fn test_storage_errors_are_internal() {
        let err: AppError = anyhow::anyhow!("disk full").into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "internal_error");
    }
}
