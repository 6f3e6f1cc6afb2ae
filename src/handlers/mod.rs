pub mod admin;
pub mod availability;
pub mod bookings;
pub mod calendar;
pub mod events;
pub mod health;
pub mod jobs;
pub mod quotes;
pub mod service_requests;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/availability", get(availability::get_availability))
        .route("/api/bookings", post(bookings::create_booking))
        .route("/api/bookings/:id", get(bookings::get_booking))
        .route("/api/bookings/:id/confirm", post(bookings::confirm_booking))
        .route("/api/bookings/:id/check-in", post(bookings::check_in))
        .route("/api/bookings/:id/complete", post(bookings::check_out))
        .route("/api/bookings/:id/cancel", post(bookings::cancel_booking))
        .route(
            "/api/bookings/:id/reschedule",
            post(bookings::reschedule_booking),
        )
        .route(
            "/api/service-requests",
            post(service_requests::create_service_request),
        )
        .route(
            "/api/service-requests/:id",
            get(service_requests::get_service_request),
        )
        .route(
            "/api/service-requests/:id/cancel",
            post(service_requests::cancel_service_request),
        )
        .route(
            "/api/service-requests/:id/quotes",
            post(service_requests::submit_quote),
        )
        .route("/api/quotes/:id/accept", post(quotes::accept_quote))
        .route("/api/quotes/:id/withdraw", post(quotes::withdraw_quote))
        .route("/api/jobs/:id", get(jobs::get_job))
        .route("/api/jobs/:id/start", post(jobs::start_job))
        .route("/api/jobs/:id/complete", post(jobs::complete_job))
        .route("/api/jobs/:id/cancel", post(jobs::cancel_job))
        .route("/api/jobs/:id/rate", post(jobs::rate_job))
        .route("/calendar/:booking_id", get(calendar::download_ics))
        .route("/api/events", get(events::events_stream))
        .route(
            "/api/admin/rules",
            get(admin::list_rules).post(admin::upsert_rule),
        )
        .route(
            "/api/admin/rules/:id/deactivate",
            post(admin::deactivate_rule),
        )
        .route("/api/admin/bookings", get(admin::get_bookings))
        .route("/api/admin/activity", get(admin::get_activity))
        .with_state(state)
}
