//! Test utilities and fixtures for streamgate integration tests

#![allow(dead_code)]

use axum::routing::{get, post};
use axum::Router;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

// Re-export the main library crate
pub use streamgate::db::{init_db, queries, AppState};
pub use streamgate::handlers::public::{
    create_checkout, create_pair_session, link_pair_session, payment_status, poll_pair_session,
    redeem_code,
};
pub use streamgate::handlers::webhooks::{webhook_get, webhook_post};
pub use streamgate::models::*;
pub use streamgate::plan::Plan;

pub const TEST_ADMIN_KEY: &str = "test-admin-key";

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Create an AppState for testing with an in-memory database.
///
/// The pool is capped at one connection so every request sees the single
/// in-memory database the schema was created on.
pub fn create_test_app_state() -> AppState {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }

    AppState {
        db: pool,
        http: reqwest::Client::new(),
        base_url: "http://localhost:3000".to_string(),
        admin_api_key: Some(TEST_ADMIN_KEY.to_string()),
        conversion_webhook_url: None,
        welcome_webhook_url: None,
    }
}

/// Create a Router with all public and webhook endpoints
/// (without rate limiting for tests)
pub fn public_app(state: AppState) -> Router {
    Router::new()
        .route("/redeem", post(redeem_code))
        .route("/pay/checkout", post(create_checkout))
        .route("/pay/status", get(payment_status))
        .route(
            "/tv/pair",
            post(create_pair_session)
                .get(poll_pair_session)
                .put(link_pair_session),
        )
        .route("/pay/webhook", post(webhook_post).get(webhook_get))
        .with_state(state)
}

/// Create a Router with the admin endpoints (auth middleware included)
pub fn admin_app(state: AppState) -> Router {
    streamgate::handlers::admin::router(state.clone()).with_state(state)
}

/// Get the current timestamp
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Get a future timestamp (days from now)
pub fn future_timestamp(days: i64) -> i64 {
    now() + (days * 86400)
}

/// Get a past timestamp (days ago)
pub fn past_timestamp(days: i64) -> i64 {
    now() - (days * 86400)
}

/// Create a test user
pub fn create_test_user(conn: &Connection) -> User {
    queries::create_user(conn).expect("Failed to create test user")
}

/// Create a test user with a device already bound
pub fn create_test_user_with_device(conn: &mut Connection, device_id: &str) -> User {
    queries::get_or_create_user_for_device(conn, device_id, Some("test-agent"))
        .expect("Failed to create test user with device")
}

/// Create a manual redemption code for a plan
pub fn create_test_code(conn: &Connection, plan: Plan) -> Redemption {
    queries::create_redemption(conn, &CreateRedemption::manual(plan))
        .expect("Failed to create test code")
}

/// Create an active subscription for a user
pub fn create_test_subscription(conn: &Connection, user_id: &str, plan: Plan) -> Subscription {
    queries::create_subscription(
        conn,
        user_id,
        plan,
        plan.duration_days(),
        plan.max_devices(),
        None,
    )
    .expect("Failed to create test subscription")
}

/// Create a pending payment for a plan, optionally tied to a device
pub fn create_test_payment(conn: &Connection, plan: Plan, device_id: Option<&str>) -> Payment {
    let input = CreatePayment {
        order_id: uuid::Uuid::new_v4().to_string(),
        plan,
        bonus_days: 0,
        device_id: device_id.map(String::from),
        amount_cents: plan.price_cents(),
        currency: "usd".to_string(),
        gateway: Some("testpay".to_string()),
    };
    queries::create_payment(conn, &input).expect("Failed to create test payment")
}

/// Build a JSON POST request
pub fn json_post(uri: &str, body: serde_json::Value) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Build a JSON PUT request
pub fn json_put(uri: &str, body: serde_json::Value) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::builder()
        .method("PUT")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Build a GET request
pub fn get_req(uri: &str) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

/// Decode a response body as JSON
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");
    serde_json::from_slice(&bytes).expect("Response should be valid JSON")
}
