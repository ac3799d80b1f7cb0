//! Quota-aware key selection with compare-and-set reservations.
//!
//! The engine never holds a lock across a reservation. It reads a snapshot
//! of the pool, ranks eligible keys least-used-first, and tries to commit
//! each candidate with a filtered update that pins every field the
//! decision depended on. A lost race moves on to the next candidate; a
//! fully contended round is retried a bounded number of times.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::Result;
use super::key::{epoch_ms_now, ApiKey, KeyStatus};
use super::plan::Plan;
use super::store::{KeyFilter, KeyStore, KeyUpdate};

/// CAS rounds before a contended pool is reported as unavailable.
const MAX_ATTEMPTS: u32 = 3;
/// Pause between contended rounds.
const RETRY_BACKOFF: Duration = Duration::from_millis(20);

/// One successful reservation: the key the caller may use now, plus the
/// earliest moment a future request for the same key can succeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub subscription_id: String,
    pub plan: Plan,
    #[serde(rename = "avgRequestIntervalMs")]
    pub avg_interval_ms: u64,
    pub last_used: u64,
    pub next_request_allowed_at: u64,
}

/// Outcome of a single selection round.
enum Round {
    Reserved(Reservation),
    /// No key was eligible at the sampled time; retrying cannot help.
    NoCandidates,
    /// Eligible keys existed but every commit lost its race.
    Contended,
}

/// The key selection and rate-enforcement engine.
pub struct ReservationEngine<S: KeyStore> {
    store: S,
}

impl<S: KeyStore> ReservationEngine<S> {
    pub fn new(store: S) -> Self {
        ReservationEngine { store }
    }

    /// Reserve one key for immediate use.
    ///
    /// Samples the wall clock, runs a selection round, and retries up to
    /// two more times with a short pause when every candidate commit was
    /// beaten by a concurrent reserver. Returns `None` when no key is
    /// available; that is an answer, not an error.
    pub async fn reserve(&self) -> Result<Option<Reservation>> {
        for attempt in 1..=MAX_ATTEMPTS {
            match self.round(epoch_ms_now()).await? {
                Round::Reserved(reservation) => return Ok(Some(reservation)),
                Round::NoCandidates => return Ok(None),
                Round::Contended => {
                    debug!(attempt, "reservation round contended");
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(RETRY_BACKOFF).await;
                    }
                }
            }
        }
        Ok(None)
    }

    /// Run a single selection round at the supplied timestamp.
    ///
    /// This is the deterministic core of [`reserve`](Self::reserve): no
    /// clock sampling, no retry. Tests drive window and spacing behavior
    /// through it with synthetic timestamps.
    pub async fn reserve_at(&self, now: u64) -> Result<Option<Reservation>> {
        match self.round(now).await? {
            Round::Reserved(reservation) => Ok(Some(reservation)),
            _ => Ok(None),
        }
    }

    async fn round(&self, now: u64) -> Result<Round> {
        let snapshot = self.store.find_all().await?;

        let mut candidates: Vec<&ApiKey> = Vec::new();
        for key in &snapshot {
            // A stored daily counter at the limit inside an unexpired day
            // marks the key exhausted; flip it so `/status` reflects the
            // state promptly, and never select it.
            if !key.day_expired(now) && key.used_daily >= key.daily_limit {
                if key.status == KeyStatus::Active {
                    self.flip_exhausted(key).await;
                }
                continue;
            }
            if key.status != KeyStatus::Active {
                continue;
            }
            if key.effective_used_daily(now) >= key.daily_limit {
                continue;
            }
            if key.effective_used_in_window(now) >= key.window_limit {
                continue;
            }
            if !key.spacing_elapsed(now) {
                continue;
            }
            candidates.push(key);
        }

        if candidates.is_empty() {
            return Ok(Round::NoCandidates);
        }

        // Least-used-first balances load across the pool; the remaining
        // ties make the order deterministic.
        candidates.sort_by(|a, b| {
            a.effective_used_in_window(now)
                .cmp(&b.effective_used_in_window(now))
                .then_with(|| a.last_used.cmp(&b.last_used))
                .then_with(|| a.subscription_id.cmp(&b.subscription_id))
        });

        for key in candidates {
            if let Some(reservation) = self.try_commit(key, now).await? {
                return Ok(Round::Reserved(reservation));
            }
        }

        Ok(Round::Contended)
    }

    /// Attempt to commit a reservation of `key` as observed in the
    /// snapshot. Returns `None` when a concurrent writer got there first.
    async fn try_commit(&self, key: &ApiKey, now: u64) -> Result<Option<Reservation>> {
        let window_expired = key.window_expired(now);
        let day_expired = key.day_expired(now);

        let new_used_in_window = if window_expired { 1 } else { key.used_in_window + 1 };
        let new_used_daily = if day_expired { 1 } else { key.used_daily + 1 };
        let new_status = if new_used_daily >= key.daily_limit {
            KeyStatus::Exhausted
        } else {
            KeyStatus::Active
        };

        let filter = KeyFilter::pinned(key);
        let update = KeyUpdate {
            status: Some(new_status),
            used_in_window: Some(new_used_in_window),
            window_start: Some(if window_expired { now } else { key.window_start }),
            used_daily: Some(new_used_daily),
            day_start: Some(if day_expired { now } else { key.day_start }),
            last_used: Some(now),
            ..Default::default()
        };

        match self.store.find_one_and_update(&filter, &update).await {
            Ok(Some(committed)) => Ok(Some(Reservation {
                next_request_allowed_at: committed.last_used + committed.avg_interval_ms,
                subscription_id: committed.subscription_id,
                plan: committed.plan,
                avg_interval_ms: committed.avg_interval_ms,
                last_used: committed.last_used,
            })),
            Ok(None) => {
                debug!(
                    subscription_id = %key.subscription_id,
                    "lost reservation race"
                );
                Ok(None)
            }
            Err(err) if !err.is_retryable() => {
                // A bad document must not take the whole pool down.
                warn!(
                    subscription_id = %key.subscription_id,
                    error = %err,
                    "skipping key after store error"
                );
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Best-effort `active -> exhausted` transition. Losing this write is
    /// harmless: the key stays unselectable through the candidate filter.
    async fn flip_exhausted(&self, key: &ApiKey) {
        let filter = KeyFilter {
            subscription_id: key.subscription_id.clone(),
            status: Some(KeyStatus::Active),
            used_daily: Some(key.used_daily),
            day_start: Some(key.day_start),
            ..Default::default()
        };
        let update = KeyUpdate {
            status: Some(KeyStatus::Exhausted),
            ..Default::default()
        };
        match self.store.update_one(&filter, &update).await {
            Ok(1) => debug!(subscription_id = %key.subscription_id, "key exhausted"),
            Ok(_) => {}
            Err(err) => warn!(
                subscription_id = %key.subscription_id,
                error = %err,
                "failed to mark key exhausted"
            ),
        }
    }
}
