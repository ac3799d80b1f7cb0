//! In-process key store.
//!
//! All documents live under a single map lock, which trivially satisfies
//! the contract's per-document atomicity. The handle is cheap to clone and
//! shares the underlying map, so the engine, registry, and sweeper can all
//! hold the same store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{KeyFilter, KeyStore, KeyUpdate};
use crate::core::error::StoreError;
use crate::core::key::ApiKey;

/// In-memory [`KeyStore`] backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    keys: Arc<Mutex<HashMap<String, ApiKey>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.lock().is_empty()
    }
}

#[async_trait]
impl KeyStore for MemoryStore {
    async fn find_all(&self) -> Result<Vec<ApiKey>, StoreError> {
        Ok(self.keys.lock().values().cloned().collect())
    }

    async fn find_one(&self, subscription_id: &str) -> Result<Option<ApiKey>, StoreError> {
        Ok(self.keys.lock().get(subscription_id).cloned())
    }

    async fn insert_one(&self, doc: ApiKey) -> Result<(), StoreError> {
        let mut keys = self.keys.lock();
        if keys.contains_key(&doc.subscription_id) {
            return Err(StoreError::Duplicate {
                subscription_id: doc.subscription_id,
            });
        }
        keys.insert(doc.subscription_id.clone(), doc);
        Ok(())
    }

    async fn update_one(
        &self,
        filter: &KeyFilter,
        update: &KeyUpdate,
    ) -> Result<u64, StoreError> {
        let mut keys = self.keys.lock();
        match keys.get_mut(&filter.subscription_id) {
            Some(doc) if filter.matches(doc) => {
                update.apply(doc);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn find_one_and_update(
        &self,
        filter: &KeyFilter,
        update: &KeyUpdate,
    ) -> Result<Option<ApiKey>, StoreError> {
        let mut keys = self.keys.lock();
        match keys.get_mut(&filter.subscription_id) {
            Some(doc) if filter.matches(doc) => {
                update.apply(doc);
                Ok(Some(doc.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_one(&self, subscription_id: &str) -> Result<bool, StoreError> {
        Ok(self.keys.lock().remove(subscription_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::key::KeyStatus;
    use crate::core::plan::{Plan, PlanPolicy};

    const T0: u64 = 1_700_000_000_000;

    fn doc(id: &str) -> ApiKey {
        let policy = PlanPolicy::default();
        ApiKey::fresh(id, Plan::Pro, policy.limits(Plan::Pro), T0)
    }

    #[tokio::test]
    async fn insert_and_find() {
        let store = MemoryStore::new();
        store.insert_one(doc("sub_1")).await.unwrap();

        let found = store.find_one("sub_1").await.unwrap().unwrap();
        assert_eq!(found.subscription_id, "sub_1");
        assert!(store.find_one("sub_2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = MemoryStore::new();
        store.insert_one(doc("sub_1")).await.unwrap();

        let err = store.insert_one(doc("sub_1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { subscription_id } if subscription_id == "sub_1"));
    }

    #[tokio::test]
    async fn pinned_update_misses_on_drift() {
        let store = MemoryStore::new();
        store.insert_one(doc("sub_1")).await.unwrap();
        let snapshot = store.find_one("sub_1").await.unwrap().unwrap();

        // A competing writer commits first.
        let won = store
            .update_one(
                &KeyFilter::pinned(&snapshot),
                &KeyUpdate {
                    used_in_window: Some(1),
                    last_used: Some(T0 + 10),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(won, 1);

        // The stale snapshot no longer matches.
        let lost = store
            .update_one(
                &KeyFilter::pinned(&snapshot),
                &KeyUpdate {
                    used_in_window: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(lost, 0);
    }

    #[tokio::test]
    async fn find_one_and_update_returns_post_image() {
        let store = MemoryStore::new();
        store.insert_one(doc("sub_1")).await.unwrap();

        let updated = store
            .find_one_and_update(
                &KeyFilter::id("sub_1"),
                &KeyUpdate {
                    status: Some(KeyStatus::Exhausted),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, KeyStatus::Exhausted);

        let missed = store
            .find_one_and_update(&KeyFilter::id("sub_2"), &KeyUpdate::default())
            .await
            .unwrap();
        assert!(missed.is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new();
        store.insert_one(doc("sub_1")).await.unwrap();

        assert!(store.delete_one("sub_1").await.unwrap());
        assert!(!store.delete_one("sub_1").await.unwrap());
    }
}
