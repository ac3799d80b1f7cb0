//! Administrative key registration and the read-only projections.

use serde::{Deserialize, Serialize};

use super::error::{BrokerError, Result, StoreError};
use super::key::{epoch_ms_now, ApiKey, KeyStatus};
use super::plan::{Plan, PlanPolicy};
use super::store::{KeyFilter, KeyStore, KeyUpdate};

/// Whether `register` created a new key or updated an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registered {
    Created,
    Updated,
}

/// Full projection of one key, as served by `/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStatusView {
    pub subscription_id: String,
    pub plan: Plan,
    pub status: KeyStatus,
    pub window_limit: u64,
    pub daily_limit: u64,
    #[serde(rename = "avgRequestIntervalMs")]
    pub avg_interval_ms: u64,
    pub used_in_window: u64,
    pub window_start: u64,
    pub used_daily: u64,
    pub day_start: u64,
    pub last_used: u64,
    pub next_request_allowed_at: u64,
}

impl From<ApiKey> for KeyStatusView {
    fn from(key: ApiKey) -> Self {
        KeyStatusView {
            next_request_allowed_at: key.next_request_allowed_at(),
            subscription_id: key.subscription_id,
            plan: key.plan,
            status: key.status,
            window_limit: key.window_limit,
            daily_limit: key.daily_limit,
            avg_interval_ms: key.avg_interval_ms,
            used_in_window: key.used_in_window,
            window_start: key.window_start,
            used_daily: key.used_daily,
            day_start: key.day_start,
            last_used: key.last_used,
        }
    }
}

/// Limits-only projection of one key, as served by `/limits`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyLimitsView {
    pub subscription_id: String,
    pub plan: Plan,
    pub window_limit: u64,
    pub daily_limit: u64,
    pub avg_interval_ms: u64,
    pub last_used: u64,
    pub next_request_allowed_at: u64,
}

impl From<ApiKey> for KeyLimitsView {
    fn from(key: ApiKey) -> Self {
        KeyLimitsView {
            next_request_allowed_at: key.next_request_allowed_at(),
            subscription_id: key.subscription_id,
            plan: key.plan,
            window_limit: key.window_limit,
            daily_limit: key.daily_limit,
            avg_interval_ms: key.avg_interval_ms,
            last_used: key.last_used,
        }
    }
}

/// Registers, updates, deletes, and lists keys.
///
/// These operations are also the seam reconcilers use: a config re-sync
/// calls `register` per desired key, an upstream health cull calls
/// `delete`.
pub struct KeyRegistry<S: KeyStore> {
    store: S,
    policy: PlanPolicy,
}

impl<S: KeyStore> KeyRegistry<S> {
    pub fn new(store: S, policy: PlanPolicy) -> Self {
        KeyRegistry { store, policy }
    }

    /// Register a key, or update its plan if it already exists.
    ///
    /// A new key starts active with fresh counters and both anchors at the
    /// current time. Re-registering touches only the plan and the limits
    /// derived from it; counters, anchors, and the last-used timestamp are
    /// preserved so a plan change never grants extra quota.
    pub async fn register(&self, subscription_id: &str, plan: &str) -> Result<Registered> {
        let subscription_id = subscription_id.trim();
        if subscription_id.is_empty() {
            return Err(BrokerError::InvalidArgument(
                "subscription id must not be empty".into(),
            ));
        }

        let plan = Plan::normalize(plan);
        let limits = self.policy.limits(plan);

        if self.store.find_one(subscription_id).await?.is_none() {
            let doc = ApiKey::fresh(subscription_id, plan, limits, epoch_ms_now());
            match self.store.insert_one(doc).await {
                Ok(()) => return Ok(Registered::Created),
                // A concurrent replica inserted first; update instead.
                Err(StoreError::Duplicate { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }

        let update = KeyUpdate {
            plan: Some(plan),
            window_limit: Some(limits.window_limit),
            daily_limit: Some(limits.daily_limit),
            avg_interval_ms: Some(limits.avg_interval_ms),
            ..Default::default()
        };
        let matched = self
            .store
            .update_one(&KeyFilter::id(subscription_id), &update)
            .await?;
        if matched == 0 {
            // Deleted between the lookup and the update; start fresh.
            let doc = ApiKey::fresh(subscription_id, plan, limits, epoch_ms_now());
            self.store.insert_one(doc).await?;
            return Ok(Registered::Created);
        }
        Ok(Registered::Updated)
    }

    /// Remove a key. Removing an absent key succeeds.
    ///
    /// Returns whether a document was actually removed.
    pub async fn delete(&self, subscription_id: &str) -> Result<bool> {
        let subscription_id = subscription_id.trim();
        if subscription_id.is_empty() {
            return Err(BrokerError::InvalidArgument(
                "subscription id must not be empty".into(),
            ));
        }
        Ok(self.store.delete_one(subscription_id).await?)
    }

    /// All keys with their full metadata, ordered by subscription id.
    pub async fn list_status(&self) -> Result<Vec<KeyStatusView>> {
        let mut keys = self.store.find_all().await?;
        keys.sort_by(|a, b| a.subscription_id.cmp(&b.subscription_id));
        Ok(keys.into_iter().map(KeyStatusView::from).collect())
    }

    /// The limits-only projection, ordered by subscription id.
    pub async fn list_limits(&self) -> Result<Vec<KeyLimitsView>> {
        let mut keys = self.store.find_all().await?;
        keys.sort_by(|a, b| a.subscription_id.cmp(&b.subscription_id));
        Ok(keys.into_iter().map(KeyLimitsView::from).collect())
    }
}
