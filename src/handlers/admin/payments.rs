use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::Result;
use crate::extractors::{Json, Query};
use crate::models::Payment;

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

/// Query parameters for GET /admin/payments
#[derive(Debug, Deserialize)]
pub struct AdminPaymentsQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AdminPaymentsResponse {
    pub payments: Vec<Payment>,
}

/// GET /admin/payments - Recent orders, newest first.
///
/// The reconciliation blind spot to look for here: status success with a
/// NULL subscription_id means the grant could not resolve a user and the
/// order needs manual repair.
pub async fn admin_payments_list(
    State(state): State<AppState>,
    Query(query): Query<AdminPaymentsQuery>,
) -> Result<Json<AdminPaymentsResponse>> {
    let conn = state.db.get()?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let payments = queries::list_recent_payments(&conn, limit)?;

    Ok(Json(AdminPaymentsResponse { payments }))
}
