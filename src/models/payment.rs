use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::plan::Plan;

/// Payment lifecycle: `pending` is the only non-terminal state.
/// `success` and `failed` are terminal; once set they never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "success" => Ok(PaymentStatus::Success),
            "failed" => Ok(PaymentStatus::Failed),
            _ => Err(()),
        }
    }
}

/// A payment order created at checkout and reconciled by gateway callbacks.
///
/// Gateway reference columns (`gateway_txn_id`, `gateway_key`) are fallback
/// correlation handles; `order_id` is the primary one. The `last_gateway_*`
/// columns plus `verify_attempts` form the audit trail and are updated on
/// every callback regardless of the outcome.
#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    pub status: PaymentStatus,
    pub plan: Plan,
    /// Promo days added on top of the plan duration when granting
    pub bonus_days: i64,
    /// Device that initiated checkout; resolves to the user at grant time
    pub device_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub gateway: Option<String>,
    pub gateway_txn_id: Option<String>,
    pub gateway_key: Option<String>,
    pub last_gateway_status: Option<String>,
    pub last_gateway_payload: Option<String>,
    pub verify_attempts: i64,
    pub failure_reason: Option<String>,
    pub user_id: Option<String>,
    pub subscription_id: Option<String>,
    pub access_code: Option<String>,
    pub access_code_id: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
    pub failed_at: Option<i64>,
}

#[derive(Debug)]
pub struct CreatePayment {
    pub order_id: String,
    pub plan: Plan,
    pub bonus_days: i64,
    pub device_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub gateway: Option<String>,
}
