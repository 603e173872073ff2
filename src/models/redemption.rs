use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::plan::Plan;

/// Where a redemption code came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeSource {
    /// Created by an operator through the admin API
    Manual,
    /// Minted automatically for a completed payment
    Payment,
    Gift,
    Referral,
}

impl CodeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeSource::Manual => "manual",
            CodeSource::Payment => "payment",
            CodeSource::Gift => "gift",
            CodeSource::Referral => "referral",
        }
    }
}

impl fmt::Display for CodeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodeSource {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(CodeSource::Manual),
            "payment" => Ok(CodeSource::Payment),
            "gift" => Ok(CodeSource::Gift),
            "referral" => Ok(CodeSource::Referral),
            _ => Err(()),
        }
    }
}

/// A single-use redemption code.
///
/// `used_by_user_id` doubles as the claim marker: NULL means available, and
/// the claim is a conditional UPDATE on that NULL, so exactly one redeemer
/// can ever win. Revocation only blocks future claims; an already-redeemed
/// subscription stays valid.
#[derive(Debug, Clone, Serialize)]
pub struct Redemption {
    pub id: String,
    pub code: String,
    pub plan: Plan,
    pub duration_days: i64,
    pub max_devices: i64,
    pub source: CodeSource,
    /// Set when the code was minted for a payment; also the idempotency
    /// handle for the grant path
    pub payment_order_id: Option<String>,
    pub used_by_user_id: Option<String>,
    pub used_at: Option<i64>,
    pub revoked_at: Option<i64>,
    /// 0 = full plan; 1/2/4 = trial window in hours, scoped to one movie
    pub trial_hours: i64,
    pub trial_movie_id: Option<String>,
    /// JSON array of ids/slugs the trial movie is known under
    pub trial_movie_aliases: Option<String>,
    pub note: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct CreateRedemption {
    pub plan: Plan,
    pub duration_days: i64,
    pub max_devices: i64,
    pub source: CodeSource,
    pub payment_order_id: Option<String>,
    pub trial_hours: i64,
    pub trial_movie_id: Option<String>,
    pub trial_movie_aliases: Option<String>,
    pub note: Option<String>,
}

impl CreateRedemption {
    /// A plain manual code for the given plan, durations from the plan table.
    pub fn manual(plan: Plan) -> Self {
        Self {
            plan,
            duration_days: plan.duration_days(),
            max_devices: plan.max_devices(),
            source: CodeSource::Manual,
            payment_order_id: None,
            trial_hours: 0,
            trial_movie_id: None,
            trial_movie_aliases: None,
            note: None,
        }
    }
}

/// Aggregate counts for the admin dashboard.
#[derive(Debug, Serialize)]
pub struct RedemptionStats {
    pub total: i64,
    pub used: i64,
    pub revoked: i64,
    pub available: i64,
    pub by_plan: Vec<PlanCount>,
}

#[derive(Debug, Serialize)]
pub struct PlanCount {
    pub plan: String,
    pub total: i64,
    pub used: i64,
}
