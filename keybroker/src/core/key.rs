//! The per-key quota document and its window arithmetic.
//!
//! All timestamps are milliseconds since the Unix epoch. Windows slide
//! per-key: a window anchor is set when the first reservation after an
//! expiry lands, not on wall-clock boundaries.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use super::plan::{Plan, PlanLimits};

/// Length of the rolling reservation window in milliseconds.
pub const WINDOW_MS: u64 = 30_000;
/// Length of the rolling daily quota period in milliseconds.
pub const DAY_MS: u64 = 86_400_000;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn epoch_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_millis() as u64
}

/// Lifecycle state of a key.
///
/// `Banned` is set only by reconciliation (an upstream health check or an
/// operator); the engine and sweeper never enter or leave it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Exhausted,
    Banned,
}

/// One key document as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    /// Identity passed to the upstream provider; unique in the store.
    pub subscription_id: String,
    pub plan: Plan,
    pub status: KeyStatus,
    /// Max reservations per rolling 30 s window.
    pub window_limit: u64,
    /// Max reservations per rolling 24 h period.
    pub daily_limit: u64,
    /// Hard floor between consecutive reservations of this key.
    pub avg_interval_ms: u64,
    /// Reservations counted since `window_start`.
    pub used_in_window: u64,
    /// Anchor of the current 30 s window.
    pub window_start: u64,
    /// Reservations counted since `day_start`.
    pub used_daily: u64,
    /// Anchor of the current 24 h period.
    pub day_start: u64,
    /// Timestamp of the most recent successful reservation, 0 if never.
    pub last_used: u64,
}

impl ApiKey {
    /// A freshly registered key: active, counters zeroed, both anchors at
    /// `now`, never used.
    pub fn fresh(subscription_id: impl Into<String>, plan: Plan, limits: PlanLimits, now: u64) -> Self {
        ApiKey {
            subscription_id: subscription_id.into(),
            plan,
            status: KeyStatus::Active,
            window_limit: limits.window_limit,
            daily_limit: limits.daily_limit,
            avg_interval_ms: limits.avg_interval_ms,
            used_in_window: 0,
            window_start: now,
            used_daily: 0,
            day_start: now,
            last_used: 0,
        }
    }

    /// Whether the 30 s window anchored at `window_start` has elapsed.
    pub fn window_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.window_start) >= WINDOW_MS
    }

    /// Whether the 24 h period anchored at `day_start` has elapsed.
    pub fn day_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.day_start) >= DAY_MS
    }

    /// The window counter as the engine must read it: an elapsed window
    /// counts as zero regardless of the stored value.
    pub fn effective_used_in_window(&self, now: u64) -> u64 {
        if self.window_expired(now) {
            0
        } else {
            self.used_in_window
        }
    }

    /// Same as [`effective_used_in_window`](Self::effective_used_in_window)
    /// for the daily counter.
    pub fn effective_used_daily(&self, now: u64) -> u64 {
        if self.day_expired(now) {
            0
        } else {
            self.used_daily
        }
    }

    /// Earliest moment a future reservation of this key can succeed;
    /// zero when the key has never been used.
    pub fn next_request_allowed_at(&self) -> u64 {
        if self.last_used == 0 {
            0
        } else {
            self.last_used + self.avg_interval_ms
        }
    }

    /// Whether the spacing floor allows a reservation at `now`.
    pub fn spacing_elapsed(&self, now: u64) -> bool {
        self.last_used == 0 || now >= self.last_used + self.avg_interval_ms
    }
}
