use serde::Serialize;

/// Anonymous account. Users are created implicitly the first time a device
/// redeems a code or completes a payment; there is no signup flow.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub referral_code: String,
    pub created_at: i64,
}
