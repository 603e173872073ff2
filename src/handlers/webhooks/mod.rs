//! Payment gateway callbacks.
//!
//! Two delivery styles converge on one reconcile path: a server-to-server
//! POST with a JSON body, and a GET link-visit fallback where the payload
//! arrives as query parameters. Response policy matters to gateways that
//! retry on non-2xx:
//!
//! - 200: reconciled (including duplicates and still-pending outcomes)
//! - 400: no recognizable correlation key; nothing was written
//! - 404: correlation key references an order we never created
//! - 5xx: only for genuine internal failures (these SHOULD be retried)

use std::collections::HashMap;

use axum::{
    extract::State,
    routing::post,
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Query};
use crate::grant;
use crate::models::{Payment, PaymentStatus};
use crate::notify::{self, ConversionEvent, WelcomeEvent};
use crate::outcome::{normalize_outcome, raw_status, CanonicalOutcome};

pub fn router() -> Router<AppState> {
    Router::new().route("/pay/webhook", post(webhook_post).get(webhook_get))
}

/// POST /pay/webhook - Server-to-server gateway push.
pub async fn webhook_post(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>> {
    reconcile(&state, payload)
}

/// GET /pay/webhook - Link-visit fallback. Some gateways redirect the payer's
/// browser here with the outcome in the query string; correlation and
/// normalization are identical to the POST path.
pub async fn webhook_get(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let payload = Value::Object(
        params
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect(),
    );
    reconcile(&state, payload)
}

/// Correlation handles pulled out of a payload, in lookup priority order.
#[derive(Debug, Default)]
struct CorrelationRef {
    txn_id: Option<String>,
    order_id: Option<String>,
    gateway_key: Option<String>,
}

impl CorrelationRef {
    fn is_empty(&self) -> bool {
        self.txn_id.is_none() && self.order_id.is_none() && self.gateway_key.is_none()
    }
}

fn extract_correlation(payload: &Value) -> CorrelationRef {
    let str_field = |names: &[&str]| -> Option<String> {
        names.iter().find_map(|name| {
            payload
                .get(name)
                .and_then(|v| match v {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
        })
    };

    CorrelationRef {
        txn_id: str_field(&["sid", "transaction_id", "txn_id"]),
        order_id: str_field(&["order_id", "orderId"]),
        gateway_key: str_field(&["key", "token"]),
    }
}

/// Find the payment a callback refers to: order id first, then transaction
/// id, then the vendor key.
fn find_payment(
    conn: &rusqlite::Connection,
    corr: &CorrelationRef,
) -> Result<Option<Payment>> {
    if let Some(ref order_id) = corr.order_id {
        if let Some(p) = queries::get_payment_by_order_id(conn, order_id)? {
            return Ok(Some(p));
        }
    }
    if let Some(ref txn_id) = corr.txn_id {
        if let Some(p) = queries::get_payment_by_txn_id(conn, txn_id)? {
            return Ok(Some(p));
        }
    }
    if let Some(ref key) = corr.gateway_key {
        if let Some(p) = queries::get_payment_by_gateway_key(conn, key)? {
            return Ok(Some(p));
        }
    }
    Ok(None)
}

/// Reconcile one gateway callback against the payment ledger.
///
/// Already-terminal success answers immediately; otherwise the audit trail
/// is updated first, then the normalized outcome drives at most one CAS
/// transition. Only the caller that wins pending -> success runs the grant,
/// and a grant failure still answers 200: the money moved, and the order
/// can be repaired from the admin payments list.
fn reconcile(state: &AppState, payload: Value) -> Result<Json<Value>> {
    let conn = state.db.get()?;

    let corr = extract_correlation(&payload);
    if corr.is_empty() {
        return Err(AppError::BadRequest(
            "No order reference in callback".into(),
        ));
    }

    let payment = find_payment(&conn, &corr)?
        .ok_or_else(|| AppError::NotFound("Unknown payment order".into()))?;

    if payment.status == PaymentStatus::Success {
        // Duplicate delivery for a finished order
        return Ok(Json(json!({
            "status": "success",
            "orderId": payment.order_id,
        })));
    }

    let payload_str = payload.to_string();
    queries::record_gateway_attempt(
        &conn,
        &payment.id,
        raw_status(&payload).as_deref(),
        &payload_str,
        corr.txn_id.as_deref(),
        corr.gateway_key.as_deref(),
    )?;

    match normalize_outcome(&payload) {
        CanonicalOutcome::Success => {
            let won = queries::try_complete_payment(&conn, &payment.order_id)?;
            if won {
                match grant::grant_entitlement(&conn, &payment) {
                    Ok(Some(outcome)) => {
                        notify::spawn_welcome_event(
                            state.http.clone(),
                            state.welcome_webhook_url.clone(),
                            WelcomeEvent {
                                user_id: outcome.user_id,
                                plan: payment.plan.as_str().to_string(),
                                access_code: outcome.access_code,
                                timestamp: Utc::now().timestamp(),
                            },
                        );
                    }
                    Ok(None) => {}
                    Err(e) => {
                        // Payment is success regardless; the grant can be
                        // replayed by an operator
                        tracing::error!(
                            order_id = %payment.order_id,
                            "Entitlement grant failed after payment success: {}",
                            e
                        );
                    }
                }
                notify::spawn_conversion_event(
                    state.http.clone(),
                    state.conversion_webhook_url.clone(),
                    ConversionEvent {
                        event: "purchase_completed".to_string(),
                        order_id: payment.order_id.clone(),
                        plan: payment.plan.as_str().to_string(),
                        amount_cents: payment.amount_cents,
                        currency: payment.currency.clone(),
                        failure_reason: None,
                        timestamp: Utc::now().timestamp(),
                    },
                );
            }
            if won {
                return Ok(Json(json!({
                    "status": "success",
                    "orderId": payment.order_id,
                })));
            }
            // Lost the CAS: the order went terminal some other way (e.g. a
            // racing failure callback). Echo what it actually became.
            let current = queries::get_payment_by_order_id(&conn, &payment.order_id)?;
            let status = current
                .map(|p| p.status.as_str())
                .unwrap_or(PaymentStatus::Success.as_str());
            Ok(Json(json!({
                "status": status,
                "orderId": payment.order_id,
            })))
        }
        CanonicalOutcome::Failed => {
            let reason = raw_status(&payload).unwrap_or_else(|| "failed".to_string());
            let won = queries::try_fail_payment(&conn, &payment.order_id, &reason)?;
            if won {
                notify::spawn_conversion_event(
                    state.http.clone(),
                    state.conversion_webhook_url.clone(),
                    ConversionEvent {
                        event: "purchase_failed".to_string(),
                        order_id: payment.order_id.clone(),
                        plan: payment.plan.as_str().to_string(),
                        amount_cents: payment.amount_cents,
                        currency: payment.currency.clone(),
                        failure_reason: Some(reason.clone()),
                        timestamp: Utc::now().timestamp(),
                    },
                );
            }
            // A failure callback racing a success one loses the CAS and the
            // payment stays success; still a 200 either way
            let current = queries::get_payment_by_order_id(&conn, &payment.order_id)?;
            let status = current
                .map(|p| p.status.as_str())
                .unwrap_or(PaymentStatus::Failed.as_str());
            Ok(Json(json!({
                "status": status,
                "orderId": payment.order_id,
            })))
        }
        CanonicalOutcome::Pending => Ok(Json(json!({
            "status": "pending",
            "orderId": payment.order_id,
        }))),
    }
}
