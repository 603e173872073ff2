use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// TV pairing session TTL.
pub const PAIR_SESSION_TTL_SECS: i64 = 10 * 60;

/// How often the TV should poll the session while pending.
pub const PAIR_POLL_INTERVAL_MS: i64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairStatus {
    Pending,
    Paired,
    Expired,
    /// Superseded by a newer session for the same TV
    Cancelled,
}

impl PairStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PairStatus::Pending => "pending",
            PairStatus::Paired => "paired",
            PairStatus::Expired => "expired",
            PairStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PairStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PairStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PairStatus::Pending),
            "paired" => Ok(PairStatus::Paired),
            "expired" => Ok(PairStatus::Expired),
            "cancelled" => Ok(PairStatus::Cancelled),
            _ => Err(()),
        }
    }
}

/// A TV-to-phone pairing handshake.
///
/// Expiry is lazy: a pending session past `expires_at` is treated as expired
/// wherever it is read, and flipped to `expired` opportunistically. Codes
/// are unique among pending sessions only; terminal sessions may share a
/// code with a later one.
#[derive(Debug, Clone, Serialize)]
pub struct PairSession {
    pub id: String,
    pub code: String,
    pub tv_device_id: String,
    pub phone_device_id: Option<String>,
    pub user_id: Option<String>,
    pub status: PairStatus,
    pub created_at: i64,
    pub expires_at: i64,
    pub paired_at: Option<i64>,
}

impl PairSession {
    /// Pending past its deadline, as of `now`.
    pub fn is_stale(&self, now: i64) -> bool {
        self.status == PairStatus::Pending && self.expires_at <= now
    }
}
