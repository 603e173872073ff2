//! Checkout and status-poll tests, plus the full purchase round trip.

use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

mod common;
use common::*;

#[tokio::test]
async fn test_checkout_creates_pending_order_with_plan_price() {
    let state = create_test_app_state();

    let response = public_app(state.clone())
        .oneshot(json_post(
            "/pay/checkout",
            json!({ "plan": "monthly", "deviceId": "phone-1" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["plan"], "monthly");
    assert_eq!(body["amountCents"], 10900);
    assert_eq!(body["currency"], "usd");
    let order_id = body["orderId"].as_str().unwrap();
    assert!(!order_id.is_empty());

    let conn = state.db.get().unwrap();
    let payment = queries::get_payment_by_order_id(&conn, order_id)
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.device_id.as_deref(), Some("phone-1"));
    assert_eq!(payment.bonus_days, 0);
}

#[tokio::test]
async fn test_checkout_validation() {
    let state = create_test_app_state();
    let app = public_app(state);

    let response = app
        .clone()
        .oneshot(json_post(
            "/pay/checkout",
            json!({ "plan": "lifetime", "deviceId": "phone-1" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(json_post(
            "/pay/checkout",
            json!({ "plan": "monthly", "deviceId": "" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(json_post(
            "/pay/checkout",
            json!({ "plan": "monthly", "deviceId": "phone-1", "bonusDays": 120 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_poll_for_unknown_order_is_404() {
    let state = create_test_app_state();

    let response = public_app(state)
        .oneshot(get_req("/pay/status?orderId=nope"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_status_poll_never_reconciles() {
    let state = create_test_app_state();
    let order_id;
    {
        let conn = state.db.get().unwrap();
        order_id = create_test_payment(&conn, Plan::Weekly, Some("phone-1")).order_id;
    }

    let response = public_app(state.clone())
        .oneshot(get_req(&format!("/pay/status?orderId={}", order_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");
    assert!(body.get("accessCode").is_none());

    let conn = state.db.get().unwrap();
    let payment = queries::get_payment_by_order_id(&conn, &order_id)
        .unwrap()
        .unwrap();
    assert_eq!(payment.verify_attempts, 0, "polling is read-only");
}

#[tokio::test]
async fn test_status_poll_reports_failure_reason() {
    let state = create_test_app_state();
    let order_id;
    {
        let conn = state.db.get().unwrap();
        order_id = create_test_payment(&conn, Plan::Monthly, Some("phone-1")).order_id;
        queries::try_fail_payment(&conn, &order_id, "declined").unwrap();
    }

    let response = public_app(state)
        .oneshot(get_req(&format!("/pay/status?orderId={}", order_id)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["status"], "failed");
    assert_eq!(body["failureReason"], "declined");
    assert!(body.get("accessCode").is_none());
}

#[tokio::test]
async fn test_full_purchase_round_trip() {
    let state = create_test_app_state();
    {
        let mut conn = state.db.get().unwrap();
        create_test_user_with_device(&mut conn, "phone-1");
    }

    let app = public_app(state.clone());

    // Checkout
    let response = app
        .clone()
        .oneshot(json_post(
            "/pay/checkout",
            json!({ "plan": "yearly", "deviceId": "phone-1", "bonusDays": 15 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let order_id = body_json(response).await["orderId"]
        .as_str()
        .unwrap()
        .to_string();

    // Gateway confirms
    let response = app
        .clone()
        .oneshot(json_post(
            "/pay/webhook",
            json!({ "order_id": order_id, "status": "paid" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The client's poll now carries the access code
    let response = app
        .oneshot(get_req(&format!("/pay/status?orderId={}", order_id)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["status"], "success");
    let access_code = body["accessCode"].as_str().unwrap();
    assert_eq!(access_code.len(), 8);

    // Bonus days stretched the subscription past the plan duration
    let conn = state.db.get().unwrap();
    let user = queries::get_user_by_device(&conn, "phone-1").unwrap().unwrap();
    let sub = queries::get_active_subscription(&conn, &user.id)
        .unwrap()
        .unwrap();
    assert_eq!(sub.plan, Plan::Yearly);
    assert!(sub.is_active(now()));
    assert!(sub.expires_at > future_timestamp(365 + 14));
    assert!(sub.expires_at <= future_timestamp(365 + 15) + 5);
}
