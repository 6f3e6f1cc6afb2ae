use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tokio::sync::broadcast;
use tower::ServiceExt;

use servicebook::config::AppConfig;
use servicebook::db::SqliteRepository;
use servicebook::handlers;
use servicebook::services::billing::{BillingProvider, PaymentOutcome};
use servicebook::services::coordinator::Coordinator;
use servicebook::services::notify::BroadcastNotifier;
use servicebook::state::AppState;

// ── Mock Providers ──

struct MockBilling {
    outcome: Mutex<PaymentOutcome>,
    calls: Mutex<Vec<String>>,
}

impl MockBilling {
    fn new(outcome: PaymentOutcome) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            calls: Mutex::new(vec![]),
        }
    }
}

#[async_trait]
impl BillingProvider for MockBilling {
    async fn confirm_payment(&self, booking_id: &str) -> anyhow::Result<PaymentOutcome> {
        self.calls.lock().unwrap().push(booking_id.to_string());
        Ok(self.outcome.lock().unwrap().clone())
    }
}

// ── Helpers ──

const TOKEN: &str = "test-token";
// 2030-06-03 is a Monday.
const MONDAY: &str = "2030-06-03";

fn test_config() -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        admin_token: TOKEN.to_string(),
        business_name: "Test Biz".to_string(),
        billing_url: "".to_string(),
        billing_api_key: "".to_string(),
        payment_window_minutes: 30,
        sweep_interval_secs: 60,
        notify_webhook_url: "".to_string(),
        notify_webhook_secret: "".to_string(),
    }
}

fn test_state_with_billing(outcome: PaymentOutcome) -> (Arc<AppState>, Arc<MockBilling>) {
    let repo = Arc::new(SqliteRepository::open(":memory:").unwrap());
    let billing = Arc::new(MockBilling::new(outcome));
    let (events_tx, _) = broadcast::channel(64);
    let coordinator = Arc::new(Coordinator::new(
        repo.clone(),
        billing.clone(),
        Arc::new(BroadcastNotifier::new(events_tx.clone())),
        repo.clone(),
        chrono::Duration::minutes(30),
    ));
    let state = Arc::new(AppState {
        coordinator,
        repo,
        config: test_config(),
        events_tx,
    });
    (state, billing)
}

fn test_state() -> Arc<AppState> {
    test_state_with_billing(PaymentOutcome::Approved).0
}

fn test_app(state: Arc<AppState>) -> Router {
    handlers::router(state)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn admin_get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("Authorization", format!("Bearer {TOKEN}"))
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn admin_post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Authorization", format!("Bearer {TOKEN}"))
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(state: &Arc<AppState>, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let res = test_app(state.clone()).oneshot(req).await.unwrap();
    let status = res.status();
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

async fn seed_monday_rule(state: &Arc<AppState>, max: u32) {
    let (status, _) = send(
        state,
        admin_post_json(
            "/api/admin/rules",
            &format!(
                r#"{{"day_of_week":1,"start_time":"09:00","end_time":"12:00","duration_minutes":60,"buffer_minutes":15,"max_bookings_per_day":{max}}}"#
            ),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

async fn book(state: &Arc<AppState>, customer: &str, start: &str) -> (StatusCode, serde_json::Value) {
    send(
        state,
        post_json(
            "/api/bookings",
            &format!(
                r#"{{"customer_id":"{customer}","date":"{MONDAY}","start_time":"{start}","service_type":"cleaning"}}"#
            ),
        ),
    )
    .await
}

fn slot_starts(json: &serde_json::Value) -> Vec<String> {
    json["slots"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["start_time"].as_str().unwrap().to_string())
        .collect()
}

// ── Health ──

#[tokio::test]
async fn test_health() {
    let (status, json) = send(&test_state(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

// ── Admin API Tests ──

#[tokio::test]
async fn test_admin_requires_auth() {
    let state = test_state();
    let (status, json) = send(&state, get("/api/admin/rules")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "unauthorized");

    let res = test_app(state)
        .oneshot(
            Request::builder()
                .uri("/api/admin/bookings")
                .header("Authorization", "Bearer wrong-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_rules_upsert_and_deactivate() {
    let state = test_state();
    seed_monday_rule(&state, 3).await;

    // Same (day, service type) pair edits the existing rule.
    let (_, edited) = send(
        &state,
        admin_post_json(
            "/api/admin/rules",
            r#"{"day_of_week":1,"start_time":"10:00","end_time":"12:00"}"#,
        ),
    )
    .await;

    let (status, rules) = send(&state, admin_get("/api/admin/rules")).await;
    assert_eq!(status, StatusCode::OK);
    let rules = rules.as_array().unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0]["id"], edited["id"]);
    assert_eq!(rules[0]["start_time"], "10:00");

    let (status, json) = send(
        &state,
        admin_post_json(
            &format!("/api/admin/rules/{}/deactivate", edited["id"].as_str().unwrap()),
            "{}",
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["is_available"], false);

    let (_, availability) = send(&state, get(&format!("/api/availability?date={MONDAY}"))).await;
    assert!(slot_starts(&availability).is_empty());
}

#[tokio::test]
async fn test_admin_rejects_invalid_rule() {
    let state = test_state();
    let (status, json) = send(
        &state,
        admin_post_json(
            "/api/admin/rules",
            r#"{"day_of_week":1,"start_time":"12:00","end_time":"09:00"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "validation_error");

    let (status, json) = send(
        &state,
        admin_post_json(
            "/api/admin/rules",
            r#"{"day_of_week":1,"start_time":"09:00","end_time":"12:00","buffer_minutes":4294967290}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "validation_error");

    let (status, availability) = send(&state, get(&format!("/api/availability?date={MONDAY}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(slot_starts(&availability).is_empty());
}

// ── Booking Flow ──

#[tokio::test]
async fn test_availability_and_booking_flow() {
    let state = test_state();
    seed_monday_rule(&state, 3).await;

    let (status, json) = send(
        &state,
        get(&format!("/api/availability?date={MONDAY}&service_type=cleaning")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(slot_starts(&json), vec!["09:00", "10:15", "11:30"]);

    let (status, booking) = book(&state, "cust-1", "10:15").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["status"], "pending");
    let id = booking["id"].as_str().unwrap().to_string();

    let (_, json) = send(
        &state,
        get(&format!("/api/availability?date={MONDAY}&service_type=cleaning")),
    )
    .await;
    assert_eq!(slot_starts(&json), vec!["09:00", "11:30"]);

    let (status, json) = book(&state, "cust-2", "10:15").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "slot_no_longer_available");
    assert_eq!(json["start_time"], "10:15");

    let (status, json) = send(&state, post_empty(&format!("/api/bookings/{id}/confirm"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "confirmed");

    let (_, json) = send(&state, post_empty(&format!("/api/bookings/{id}/check-in"))).await;
    assert_eq!(json["status"], "in_progress");
    let (_, json) = send(&state, post_empty(&format!("/api/bookings/{id}/complete"))).await;
    assert_eq!(json["status"], "completed");

    let (status, json) = send(&state, post_empty(&format!("/api/bookings/{id}/cancel"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "invalid_transition");
    assert_eq!(json["current"], "completed");
    assert_eq!(json["requested"], "cancelled");
}

#[tokio::test]
async fn test_declined_payment_releases_slot() {
    let (state, billing) = test_state_with_billing(PaymentOutcome::Declined {
        reason: "insufficient funds".to_string(),
    });
    seed_monday_rule(&state, 1).await;

    let (_, booking) = book(&state, "cust-1", "09:00").await;
    let id = booking["id"].as_str().unwrap().to_string();

    let (status, json) = send(&state, post_empty(&format!("/api/bookings/{id}/confirm"))).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(json["code"], "billing_confirmation_failed");
    assert_eq!(billing.calls.lock().unwrap().as_slice(), [id.clone()]);

    let (_, json) = send(&state, get(&format!("/api/bookings/{id}"))).await;
    assert_eq!(json["status"], "cancelled");
    assert_eq!(json["cancel_reason"], "billing_failed");

    let (status, _) = book(&state, "cust-2", "10:15").await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_cancel_with_reason_and_reschedule() {
    let state = test_state();
    seed_monday_rule(&state, 3).await;

    let (_, first) = book(&state, "cust-1", "09:00").await;
    let first_id = first["id"].as_str().unwrap();
    let (status, json) = send(
        &state,
        post_json(
            &format!("/api/bookings/{first_id}/cancel"),
            r#"{"reason":"admin_request","note":"closed for repairs"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cancel_reason"], "admin_request");
    assert_eq!(json["cancel_note"], "closed for repairs");

    let (status, json) = send(
        &state,
        post_json(&format!("/api/bookings/{first_id}/cancel"), r#"{"reason":"bored"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "validation_error");

    let (_, second) = book(&state, "cust-2", "10:15").await;
    let second_id = second["id"].as_str().unwrap();
    let (status, replacement) = send(
        &state,
        post_json(
            &format!("/api/bookings/{second_id}/reschedule"),
            &format!(r#"{{"date":"{MONDAY}","start_time":"11:30"}}"#),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(replacement["rescheduled_from"], second_id);
    assert_eq!(replacement["start_time"], "11:30");

    let (_, original) = send(&state, get(&format!("/api/bookings/{second_id}"))).await;
    assert_eq!(original["status"], "rescheduled");
    assert_eq!(original["rescheduled_to"], replacement["id"]);

    let (status, json) = send(&state, admin_get("/api/admin/bookings?status=rescheduled")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);

    let (_, activity) = send(&state, admin_get("/api/admin/activity?months=1")).await;
    assert_eq!(activity[0]["bookings_created"], 2);
    assert_eq!(activity[0]["bookings_cancelled"], 1);
    assert_eq!(activity[0]["bookings_rescheduled"], 1);
}

#[tokio::test]
async fn test_bad_input_and_missing_booking() {
    let state = test_state();
    let (status, json) = send(&state, get("/api/availability?date=not-a-date")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "validation_error");

    let (status, json) = send(
        &state,
        post_json(
            "/api/bookings",
            r#"{"customer_id":"c","date":"2020-01-06","start_time":"09:00","service_type":"cleaning"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "validation_error");

    let (status, json) = send(&state, get("/api/bookings/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "not_found");
}

// ── Calendar ──

#[tokio::test]
async fn test_calendar_download() {
    let state = test_state();
    seed_monday_rule(&state, 3).await;
    let (_, booking) = book(&state, "cust-1", "09:00").await;
    let id = booking["id"].as_str().unwrap();

    let res = test_app(state.clone())
        .oneshot(get(&format!("/calendar/{id}.ics")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get("content-type").unwrap(),
        "text/calendar; charset=utf-8"
    );
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let ics = String::from_utf8(body.to_vec()).unwrap();
    assert!(ics.contains("DTSTART:20300603T090000"));
    assert!(ics.contains("DTEND:20300603T100000"));
    assert!(ics.contains("SUMMARY:cleaning with Test Biz"));

    let res = test_app(state)
        .oneshot(get("/calendar/missing.ics"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

// ── Service Requests, Quotes, Jobs ──

async fn create_request(state: &Arc<AppState>) -> String {
    let (status, json) = send(
        state,
        post_json(
            "/api/service-requests",
            r#"{"customer_id":"cust-1","category":"plumbing","description":"leaky tap","urgency":"high"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["status"], "pending");
    assert_eq!(json["urgency"], "high");
    json["id"].as_str().unwrap().to_string()
}

async fn quote(state: &Arc<AppState>, request_id: &str, technician: &str) -> (StatusCode, serde_json::Value) {
    send(
        state,
        post_json(
            &format!("/api/service-requests/{request_id}/quotes"),
            &format!(
                r#"{{"technician_id":"{technician}","estimated_hours":2.0,"materials_cost_cents":1500,"labor_cost_cents":10000}}"#
            ),
        ),
    )
    .await
}

#[tokio::test]
async fn test_quote_acceptance_flow() {
    let state = test_state();
    let request_id = create_request(&state).await;

    let (status, a) = quote(&state, &request_id, "tech-a").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(a["total_cost_cents"], 11500);
    let (_, b) = quote(&state, &request_id, "tech-b").await;

    let (status, json) = quote(&state, &request_id, "tech-a").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "duplicate_quote");

    let (status, job) = send(
        &state,
        post_empty(&format!("/api/quotes/{}/accept", a["id"].as_str().unwrap())),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(job["status"], "scheduled");
    assert_eq!(job["technician_id"], "tech-a");

    let (status, json) = send(
        &state,
        post_empty(&format!("/api/quotes/{}/accept", b["id"].as_str().unwrap())),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "already_accepted");

    let (_, detail) = send(&state, get(&format!("/api/service-requests/{request_id}"))).await;
    assert_eq!(detail["status"], "assigned");
    assert_eq!(detail["quotes"].as_array().unwrap().len(), 2);
    assert_eq!(detail["job"]["technician_id"], "tech-a");
}

#[tokio::test]
async fn test_job_completion_and_rating() {
    let state = test_state();
    let request_id = create_request(&state).await;
    let (_, q) = quote(&state, &request_id, "tech-a").await;
    let (_, job) = send(
        &state,
        post_empty(&format!("/api/quotes/{}/accept", q["id"].as_str().unwrap())),
    )
    .await;
    let job_id = job["id"].as_str().unwrap().to_string();

    let (status, json) = send(&state, post_empty(&format!("/api/jobs/{job_id}/start"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "in_progress");

    let (status, json) = send(
        &state,
        post_json(&format!("/api/jobs/{job_id}/complete"), r#"{"actual_hours":2.5}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "completed");
    assert_eq!(json["actual_hours"], 2.5);

    let (status, _) = send(
        &state,
        post_json(&format!("/api/jobs/{job_id}/rate"), r#"{"stars":5,"feedback":"great"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, json) = send(
        &state,
        post_json(&format!("/api/jobs/{job_id}/rate"), r#"{"stars":3}"#),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "already_rated");

    let (_, detail) = send(&state, get(&format!("/api/service-requests/{request_id}"))).await;
    assert_eq!(detail["status"], "completed");
    assert_eq!(detail["job"]["customer_rating"], 5);
}

#[tokio::test]
async fn test_withdrawn_quote_and_closed_request() {
    let state = test_state();
    let request_id = create_request(&state).await;
    let (_, q) = quote(&state, &request_id, "tech-a").await;
    let quote_id = q["id"].as_str().unwrap();

    let (status, json) = send(&state, post_empty(&format!("/api/quotes/{quote_id}/withdraw"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["withdrawn"], true);

    let (status, _) = send(&state, post_empty(&format!("/api/quotes/{quote_id}/accept"))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, json) = send(
        &state,
        post_empty(&format!("/api/service-requests/{request_id}/cancel")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "cancelled");

    let (status, json) = quote(&state, &request_id, "tech-b").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "request_closed");
}

// ── Events ──

#[tokio::test]
async fn test_events_stream_requires_token() {
    let state = test_state();
    let (status, _) = send(&state, get("/api/events")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let res = test_app(state)
        .oneshot(get(&format!("/api/events?token={TOKEN}")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers().get("content-type").unwrap(), "text/event-stream");
}

#[tokio::test]
async fn test_booking_events_are_broadcast() {
    let state = test_state();
    let mut rx = state.events_tx.subscribe();
    seed_monday_rule(&state, 3).await;
    let (_, booking) = book(&state, "cust-1", "09:00").await;

    let event = rx.try_recv().unwrap();
    assert_eq!(event.kind(), "booking_created");
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["booking_id"], booking["id"]);
}
