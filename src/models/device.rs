use serde::Serialize;

/// A device bound to a user. `device_id` is the client-generated stable
/// identifier (installation id on phones, serial-derived on TVs) and is
/// globally unique: a device belongs to at most one user at a time.
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub id: String,
    pub user_id: String,
    pub device_id: String,
    pub user_agent: Option<String>,
    pub created_at: i64,
    pub last_seen_at: i64,
}
