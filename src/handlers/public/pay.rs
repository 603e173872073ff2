use axum::extract::State;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Query};
use crate::models::{CreatePayment, PaymentStatus};
use crate::plan::Plan;

/// Request body for POST /pay/checkout
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
    pub plan: String,
    pub device_id: String,
    #[serde(default)]
    pub gateway: Option<String>,
    /// Promo days on top of the plan duration
    #[serde(default)]
    pub bonus_days: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub order_id: String,
    pub status: String,
    pub plan: String,
    pub amount_cents: i64,
    pub currency: String,
}

/// POST /pay/checkout - Create a pending payment order.
///
/// Every payment the system will ever reconcile starts here; gateway
/// callbacks that reference an order we did not create get a 404. Amounts
/// come from the plan table, never from the client.
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(body): Json<CheckoutBody>,
) -> Result<Json<CheckoutResponse>> {
    let conn = state.db.get()?;

    let plan: Plan = body
        .plan
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Unknown plan: {}", body.plan)))?;

    if body.device_id.trim().is_empty() {
        return Err(AppError::BadRequest("deviceId is required".into()));
    }
    if !(0..=90).contains(&body.bonus_days) {
        return Err(AppError::BadRequest("bonusDays out of range".into()));
    }

    let input = CreatePayment {
        order_id: Uuid::new_v4().to_string(),
        plan,
        bonus_days: body.bonus_days,
        device_id: Some(body.device_id.trim().to_string()),
        amount_cents: plan.price_cents(),
        currency: "usd".to_string(),
        gateway: body.gateway,
    };
    let payment = queries::create_payment(&conn, &input)?;

    tracing::info!(order_id = %payment.order_id, plan = %plan, "Checkout created");

    Ok(Json(CheckoutResponse {
        order_id: payment.order_id,
        status: payment.status.as_str().to_string(),
        plan: plan.as_str().to_string(),
        amount_cents: payment.amount_cents,
        currency: payment.currency,
    }))
}

/// Query parameters for GET /pay/status
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusQuery {
    pub order_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusResponse {
    pub order_id: String,
    pub status: String,
    pub plan: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// GET /pay/status - Read-only order status for the client's polling loop.
/// Reconciliation happens only through the webhook endpoints; this never
/// writes.
pub async fn payment_status(
    State(state): State<AppState>,
    Query(query): Query<PaymentStatusQuery>,
) -> Result<Json<PaymentStatusResponse>> {
    let conn = state.db.get()?;

    let payment = queries::get_payment_by_order_id(&conn, &query.order_id)?
        .ok_or_else(|| AppError::NotFound("Order not found".into()))?;

    let access_code = match payment.status {
        PaymentStatus::Success => payment.access_code,
        _ => None,
    };

    Ok(Json(PaymentStatusResponse {
        order_id: payment.order_id,
        status: payment.status.as_str().to_string(),
        plan: payment.plan.as_str().to_string(),
        access_code,
        failure_reason: payment.failure_reason,
    }))
}
