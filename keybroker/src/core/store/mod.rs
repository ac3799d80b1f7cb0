//! Key document store contract and the in-process backend.
//!
//! The durable store is an external collaborator; the broker consumes this
//! contract, not a specific product. The one primitive everything rests on
//! is the filtered update: `update_one` and `find_one_and_update` apply if
//! and only if the filter still matches, atomically per document. A filter
//! that pins every field a computation depended on turns either call into a
//! compare-and-set.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::core::error::StoreError;
use crate::core::key::{ApiKey, KeyStatus};
use crate::core::plan::Plan;

/// Selects at most one key document.
///
/// `subscription_id` is always required; every `Some` field further pins
/// the stored value it names. A filter matches a document iff all pinned
/// fields are equal to the stored ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyFilter {
    pub subscription_id: String,
    pub status: Option<KeyStatus>,
    pub used_in_window: Option<u64>,
    pub window_start: Option<u64>,
    pub used_daily: Option<u64>,
    pub day_start: Option<u64>,
    pub last_used: Option<u64>,
}

impl KeyFilter {
    /// Filter on the subscription id alone.
    pub fn id(subscription_id: impl Into<String>) -> Self {
        KeyFilter {
            subscription_id: subscription_id.into(),
            ..Default::default()
        }
    }

    /// Pin every counter, anchor, and status field to the values observed
    /// in `snapshot`. This is the reservation engine's CAS filter.
    pub fn pinned(snapshot: &ApiKey) -> Self {
        KeyFilter {
            subscription_id: snapshot.subscription_id.clone(),
            status: Some(snapshot.status),
            used_in_window: Some(snapshot.used_in_window),
            window_start: Some(snapshot.window_start),
            used_daily: Some(snapshot.used_daily),
            day_start: Some(snapshot.day_start),
            last_used: Some(snapshot.last_used),
        }
    }

    /// Whether this filter matches `doc`. Defines the normative filter
    /// semantics; adapters translate to their native query instead.
    pub fn matches(&self, doc: &ApiKey) -> bool {
        doc.subscription_id == self.subscription_id
            && self.status.is_none_or(|v| doc.status == v)
            && self.used_in_window.is_none_or(|v| doc.used_in_window == v)
            && self.window_start.is_none_or(|v| doc.window_start == v)
            && self.used_daily.is_none_or(|v| doc.used_daily == v)
            && self.day_start.is_none_or(|v| doc.day_start == v)
            && self.last_used.is_none_or(|v| doc.last_used == v)
    }
}

/// A `$set`-style patch over the mutable fields of a key document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyUpdate {
    pub plan: Option<Plan>,
    pub status: Option<KeyStatus>,
    pub window_limit: Option<u64>,
    pub daily_limit: Option<u64>,
    pub avg_interval_ms: Option<u64>,
    pub used_in_window: Option<u64>,
    pub window_start: Option<u64>,
    pub used_daily: Option<u64>,
    pub day_start: Option<u64>,
    pub last_used: Option<u64>,
}

impl KeyUpdate {
    /// Apply the patch to `doc` in place.
    pub fn apply(&self, doc: &mut ApiKey) {
        if let Some(plan) = self.plan {
            doc.plan = plan;
        }
        if let Some(status) = self.status {
            doc.status = status;
        }
        if let Some(window_limit) = self.window_limit {
            doc.window_limit = window_limit;
        }
        if let Some(daily_limit) = self.daily_limit {
            doc.daily_limit = daily_limit;
        }
        if let Some(avg_interval_ms) = self.avg_interval_ms {
            doc.avg_interval_ms = avg_interval_ms;
        }
        if let Some(used_in_window) = self.used_in_window {
            doc.used_in_window = used_in_window;
        }
        if let Some(window_start) = self.window_start {
            doc.window_start = window_start;
        }
        if let Some(used_daily) = self.used_daily {
            doc.used_daily = used_daily;
        }
        if let Some(day_start) = self.day_start {
            doc.day_start = day_start;
        }
        if let Some(last_used) = self.last_used {
            doc.last_used = last_used;
        }
    }
}

/// Store contract for key documents.
///
/// Implementations must be `Send + Sync` and must apply `update_one` and
/// `find_one_and_update` atomically per document. Reads that encounter an
/// undecodable document log it and skip it ([`StoreError::Corrupt`] is the
/// per-document failure surface for targeted operations).
#[async_trait]
pub trait KeyStore: Send + Sync + 'static {
    /// All key documents, in no particular order.
    async fn find_all(&self) -> Result<Vec<ApiKey>, StoreError>;

    /// The document with the given subscription id, if any.
    async fn find_one(&self, subscription_id: &str) -> Result<Option<ApiKey>, StoreError>;

    /// Insert a new document. Fails with [`StoreError::Duplicate`] when the
    /// subscription id already exists.
    async fn insert_one(&self, doc: ApiKey) -> Result<(), StoreError>;

    /// Apply `update` to the document matching `filter`.
    ///
    /// Returns the matched count (0 or 1).
    async fn update_one(&self, filter: &KeyFilter, update: &KeyUpdate)
        -> Result<u64, StoreError>;

    /// Apply `update` to the document matching `filter` and return the
    /// post-image, or `None` when nothing matched.
    async fn find_one_and_update(
        &self,
        filter: &KeyFilter,
        update: &KeyUpdate,
    ) -> Result<Option<ApiKey>, StoreError>;

    /// Remove the document with the given subscription id.
    ///
    /// Returns whether a document was removed; removing an absent document
    /// is not an error.
    async fn delete_one(&self, subscription_id: &str) -> Result<bool, StoreError>;
}
