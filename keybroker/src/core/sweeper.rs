//! Periodic counter resets.
//!
//! The engine already treats elapsed windows as reset when it computes
//! effective counts, so these passes carry no correctness weight. They
//! keep the `/status` projection from drifting and return previously
//! exhausted keys to the pool promptly after a day rollover.

use tracing::debug;

use super::error::Result;
use super::key::KeyStatus;
use super::store::{KeyFilter, KeyStore, KeyUpdate};

/// Resets elapsed windows and day periods across the whole pool.
pub struct Sweeper<S: KeyStore> {
    store: S,
}

impl<S: KeyStore> Sweeper<S> {
    pub fn new(store: S) -> Self {
        Sweeper { store }
    }

    /// Zero the window counter of every key whose 30 s window has elapsed.
    ///
    /// Each reset pins the counter and anchor it observed, so a concurrent
    /// reservation commit wins and the reset is skipped for that key.
    /// Returns the number of keys reset.
    pub async fn sweep_windows(&self, now: u64) -> Result<u64> {
        let keys = self.store.find_all().await?;
        let mut reset = 0;
        for key in keys {
            if !key.window_expired(now) {
                continue;
            }
            let filter = KeyFilter {
                subscription_id: key.subscription_id.clone(),
                used_in_window: Some(key.used_in_window),
                window_start: Some(key.window_start),
                ..Default::default()
            };
            let update = KeyUpdate {
                used_in_window: Some(0),
                window_start: Some(now),
                ..Default::default()
            };
            reset += self.store.update_one(&filter, &update).await?;
        }
        if reset > 0 {
            debug!(reset, "window sweep");
        }
        Ok(reset)
    }

    /// Zero the daily counter of every key whose 24 h period has elapsed
    /// and reactivate exhausted keys. `banned` keys are left untouched.
    ///
    /// Returns the number of keys reset.
    pub async fn sweep_days(&self, now: u64) -> Result<u64> {
        let keys = self.store.find_all().await?;
        let mut reset = 0;
        for key in keys {
            if !key.day_expired(now) {
                continue;
            }
            let new_status = match key.status {
                KeyStatus::Exhausted => KeyStatus::Active,
                other => other,
            };
            let filter = KeyFilter {
                subscription_id: key.subscription_id.clone(),
                status: Some(key.status),
                used_daily: Some(key.used_daily),
                day_start: Some(key.day_start),
                ..Default::default()
            };
            let update = KeyUpdate {
                status: Some(new_status),
                used_daily: Some(0),
                day_start: Some(now),
                ..Default::default()
            };
            reset += self.store.update_one(&filter, &update).await?;
        }
        if reset > 0 {
            debug!(reset, "day sweep");
        }
        Ok(reset)
    }
}
