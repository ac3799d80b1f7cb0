//! Subscription plans and the policy deriving limits from them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Subscription plan of an upstream key.
///
/// Plans select the fixed window/daily limits and the default spacing
/// between consecutive reservations of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Pro,
    Ultimate,
}

impl Plan {
    /// Normalize a raw plan string.
    ///
    /// Matching is case-insensitive; anything unrecognized collapses to
    /// [`Plan::Ultimate`]. Normalization never fails, so a plan value can
    /// never reject a request mid-operation.
    pub fn normalize(raw: &str) -> Plan {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pro" => Plan::Pro,
            _ => Plan::Ultimate,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Pro => "pro",
            Plan::Ultimate => "ultimate",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limits derived from a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    /// Max reservations per rolling 30 s window.
    pub window_limit: u64,
    /// Max reservations per rolling 24 h period.
    pub daily_limit: u64,
    /// Hard floor between consecutive reservations of the same key.
    pub avg_interval_ms: u64,
}

/// Default spacing for `pro` keys in milliseconds.
pub const DEFAULT_PRO_INTERVAL_MS: u64 = 860;
/// Default spacing for `ultimate` keys in milliseconds.
pub const DEFAULT_ULTIMATE_INTERVAL_MS: u64 = 170;

const PRO_WINDOW_LIMIT: u64 = 35;
const PRO_DAILY_LIMIT: u64 = 100_000;
const ULTIMATE_WINDOW_LIMIT: u64 = 170;
const ULTIMATE_DAILY_LIMIT: u64 = 500_000;

/// Maps plans to limits.
///
/// The window and daily limits are fixed per plan; only the spacing
/// interval is configurable. The policy is captured at registration time:
/// a key stores the limits that were in force when it was registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanPolicy {
    pub pro_interval_ms: u64,
    pub ultimate_interval_ms: u64,
}

impl Default for PlanPolicy {
    fn default() -> Self {
        PlanPolicy {
            pro_interval_ms: DEFAULT_PRO_INTERVAL_MS,
            ultimate_interval_ms: DEFAULT_ULTIMATE_INTERVAL_MS,
        }
    }
}

impl PlanPolicy {
    pub fn new(pro_interval_ms: u64, ultimate_interval_ms: u64) -> Self {
        PlanPolicy {
            pro_interval_ms,
            ultimate_interval_ms,
        }
    }

    /// Limits for a plan under this policy.
    pub fn limits(&self, plan: Plan) -> PlanLimits {
        match plan {
            Plan::Pro => PlanLimits {
                window_limit: PRO_WINDOW_LIMIT,
                daily_limit: PRO_DAILY_LIMIT,
                avg_interval_ms: self.pro_interval_ms,
            },
            Plan::Ultimate => PlanLimits {
                window_limit: ULTIMATE_WINDOW_LIMIT,
                daily_limit: ULTIMATE_DAILY_LIMIT,
                avg_interval_ms: self.ultimate_interval_ms,
            },
        }
    }

    /// The wait hint surfaced to clients when no key is free.
    pub fn wait_hint_ms(&self) -> u64 {
        self.pro_interval_ms.min(self.ultimate_interval_ms)
    }
}
