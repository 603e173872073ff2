//! Subscription plan catalog.
//!
//! Plans are a fixed table: each plan maps to an access duration, a device
//! quota, and a checkout price. Clients never supply durations or amounts;
//! everything derives from the plan name.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    /// Single-match pass, one day
    Match,
    Weekly,
    Monthly,
    Yearly,
}

impl Plan {
    pub fn duration_days(&self) -> i64 {
        match self {
            Plan::Match => 1,
            Plan::Weekly => 7,
            Plan::Monthly => 30,
            Plan::Yearly => 365,
        }
    }

    /// Maximum simultaneous device bindings for this plan.
    pub fn max_devices(&self) -> i64 {
        match self {
            Plan::Match => 1,
            Plan::Weekly => 2,
            Plan::Monthly => 3,
            Plan::Yearly => 5,
        }
    }

    /// Checkout price in cents. The gateway amount is informational only;
    /// reconciliation never trusts amounts coming back from the wire.
    pub fn price_cents(&self) -> i64 {
        match self {
            Plan::Match => 1500,
            Plan::Weekly => 4900,
            Plan::Monthly => 10900,
            Plan::Yearly => 59900,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Match => "match",
            Plan::Weekly => "weekly",
            Plan::Monthly => "monthly",
            Plan::Yearly => "yearly",
        }
    }

    pub fn all() -> &'static [Plan] {
        &[Plan::Match, Plan::Weekly, Plan::Monthly, Plan::Yearly]
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "match" => Ok(Plan::Match),
            "weekly" => Ok(Plan::Weekly),
            "monthly" => Ok(Plan::Monthly),
            "yearly" => Ok(Plan::Yearly),
            _ => Err(()),
        }
    }
}
