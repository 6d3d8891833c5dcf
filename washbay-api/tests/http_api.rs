use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use chrono::{Datelike, NaiveDate, Utc, Weekday};
use serde_json::{json, Value};
use tower::ServiceExt;

use washbay_api::{app, AppState};
use washbay_booking::{BookingCoordinator, LogNotifier, MemoryRateGuard};
use washbay_core::repository::ReservationLedger;
use washbay_core::ScheduleRules;
use washbay_store::{MemoryStore, RedisClient};

const ADMIN_TOKEN: &str = "test-admin-token";

async fn test_state() -> (AppState, Arc<MemoryStore>) {
    let rules = ScheduleRules::default();
    let store = Arc::new(MemoryStore::new(rules.clone()));
    let rate_guard = Arc::new(MemoryRateGuard::new(100, Duration::from_secs(3600)));
    let coordinator = Arc::new(BookingCoordinator::new(
        store.clone(),
        rate_guard,
        Arc::new(LogNotifier),
        rules.clone(),
    ));

    // Nothing listens here; the middleware fails open when Redis is away.
    let redis = RedisClient::new("redis://127.0.0.1:1/")
        .await
        .expect("redis url should parse");

    let (capacity_tx, _) = tokio::sync::broadcast::channel(16);

    let state = AppState {
        capacity: store.clone(),
        coordinator,
        redis: Arc::new(redis),
        capacity_tx,
        admin_token: ADMIN_TOKEN.to_string(),
        rules,
    };
    (state, store)
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let mut req = builder.body(body).expect("request");
    // ServiceExt::oneshot skips the listener, so inject the peer address the
    // rate-limit middleware extracts.
    req.extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
    req
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn next_serviced_date() -> NaiveDate {
    let mut date = Utc::now().date_naive() + chrono::Days::new(1);
    while date.weekday() != Weekday::Wed {
        date = date + chrono::Days::new(1);
    }
    date
}

fn create_body(date: NaiveDate, phone: &str) -> Value {
    json!({
        "slot_date": date,
        "phone": phone,
        "vehicle": { "plate": "1234ABC" },
        "services": ["exterior"],
        "price_cents": 1500,
    })
}

#[tokio::test]
async fn snapshot_reports_default_capacity_for_untouched_dates() {
    let (state, _) = test_state().await;
    let app = app(state);

    let response = app
        .oneshot(request("GET", "/v1/capacity?from=2025-07-01", None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let dates = body["dates"].as_object().expect("dates map");
    // 56-day horizon over a Wednesday-only schedule.
    assert_eq!(dates.len(), 8);
    assert!(dates.values().all(|v| v.as_i64() == Some(8)));
    assert!(body["content_hash"].as_str().is_some_and(|h| h.len() == 64));
}

#[tokio::test]
async fn admin_reset_requires_bearer_token() {
    let (state, _) = test_state().await;
    let app = app(state);

    let response = app
        .oneshot(request(
            "POST",
            "/v1/admin/capacity/2025-07-16/reset",
            Some(json!({ "available": 3, "actor": "ops" })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_reset_records_before_and_after() {
    let (state, _) = test_state().await;
    let app = app(state);

    let mut req = request(
        "POST",
        "/v1/admin/capacity/2025-07-16/reset",
        Some(json!({ "available": 3, "actor": "ops" })),
    );
    req.headers_mut().insert(
        axum::http::header::AUTHORIZATION,
        format!("Bearer {}", ADMIN_TOKEN).parse().expect("header"),
    );

    let response = app.oneshot(req).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["available_before"], 8);
    assert_eq!(body["available_after"], 3);
    assert_eq!(body["actor"], "ops");
    assert!(body["audit_id"].as_str().is_some());
}

#[tokio::test]
async fn create_rejects_invalid_payload_with_field_errors() {
    let (state, _) = test_state().await;
    let app = app(state);

    // Past date and an unparseable phone.
    let response = app
        .oneshot(request(
            "POST",
            "/v1/reservations",
            Some(create_body(
                NaiveDate::from_ymd_opt(2020, 1, 1).expect("date"),
                "not-a-phone",
            )),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["kind"], "validation_error");
}

#[tokio::test]
async fn reservation_lifecycle_over_http() {
    let (state, store) = test_state().await;
    let app = app(state);
    let date = next_serviced_date();

    // Create: capacity moves from 8 to 7.
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/v1/reservations",
            Some(create_body(date, "+34600111222")),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    assert_eq!(created["remaining_capacity"], 7);
    let id: uuid::Uuid = created["reservation_id"]
        .as_str()
        .expect("id")
        .parse()
        .expect("uuid");

    // The code never crosses the API; peek at the ledger directly.
    let stored = store.get(id).await.expect("get").expect("reservation");
    let code = stored.verification_code.clone();

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/v1/reservations/verify",
            Some(json!({ "phone": "+34600111222", "code": code })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let verified = body_json(response).await;
    assert_eq!(verified["reservation"]["status"], "confirmed");
    // The projection exposes the phone but never the code.
    assert!(verified["reservation"].get("verification_code").is_none());

    // Cancel releases the slot.
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/v1/reservations/{}/cancel", id),
            Some(json!({ "reason": "changed plans" })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let cancelled = body_json(response).await;
    assert_eq!(cancelled["spaces_available"], 8);

    // A second cancel conflicts instead of incrementing again.
    let response = app
        .oneshot(request(
            "POST",
            &format!("/v1/reservations/{}/cancel", id),
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn duplicate_reservation_conflicts() {
    let (state, _) = test_state().await;
    let app = app(state);
    let date = next_serviced_date();

    let first = app
        .clone()
        .oneshot(request(
            "POST",
            "/v1/reservations",
            Some(create_body(date, "+34600111222")),
        ))
        .await
        .expect("response");
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(request(
            "POST",
            "/v1/reservations",
            Some(create_body(date, "+34600111222")),
        ))
        .await
        .expect("response");
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body = body_json(second).await;
    assert_eq!(body["kind"], "duplicate_reservation");
}
