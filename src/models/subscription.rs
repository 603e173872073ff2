use serde::Serialize;

use crate::plan::Plan;

/// An entitlement window for a user.
///
/// Expiry is lazy: rows are never flipped to `expired` by a background job.
/// "Active" always means `status = 'active' AND expires_at > now`, evaluated
/// at read time. Renewal inserts a new row rather than extending this one.
#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub plan: Plan,
    pub duration_days: i64,
    pub max_devices: i64,
    pub status: String,
    /// Redemption that produced this subscription
    pub code_id: Option<String>,
    pub created_at: i64,
    pub expires_at: i64,
}

impl Subscription {
    pub fn is_active(&self, now: i64) -> bool {
        self.status == "active" && self.expires_at > now
    }
}
