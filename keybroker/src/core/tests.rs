//! End-to-end scenarios for the selection engine, registry, and sweeper
//! working against one shared store.

use std::sync::Arc;

use super::engine::ReservationEngine;
use super::key::{KeyStatus, DAY_MS, WINDOW_MS};
use super::plan::PlanPolicy;
use super::registry::KeyRegistry;
use super::store::{KeyFilter, KeyStore, KeyUpdate, MemoryStore};
use super::sweeper::Sweeper;

// Far enough ahead of the wall clock that the anchors a registration
// stamps always read as expired at T0, leaving the scenarios in full
// control of window and day state.
const T0: u64 = 4_000_000_000_000;

struct Pool {
    store: MemoryStore,
    engine: ReservationEngine<MemoryStore>,
    registry: KeyRegistry<MemoryStore>,
}

fn pool() -> Pool {
    let store = MemoryStore::new();
    Pool {
        engine: ReservationEngine::new(store.clone()),
        registry: KeyRegistry::new(store.clone(), PlanPolicy::default()),
        store,
    }
}

#[tokio::test]
async fn single_pro_key_enforces_spacing() {
    let pool = pool();
    pool.registry.register("sub_pro_test", "pro").await.unwrap();

    let first = pool
        .engine
        .reserve_at(T0)
        .await
        .unwrap()
        .expect("fresh key is reservable");
    assert_eq!(first.subscription_id, "sub_pro_test");
    assert_eq!(first.avg_interval_ms, 860);
    assert_eq!(first.last_used, T0);
    assert_eq!(first.next_request_allowed_at, T0 + 860);

    // Back-to-back at the same instant: the spacing floor blocks.
    assert!(pool.engine.reserve_at(T0).await.unwrap().is_none());
    assert!(pool.engine.reserve_at(T0 + 859).await.unwrap().is_none());

    let third = pool
        .engine
        .reserve_at(T0 + 870)
        .await
        .unwrap()
        .expect("spacing has elapsed");
    assert_eq!(third.subscription_id, "sub_pro_test");
}

#[tokio::test]
async fn plans_alternate_under_load() {
    let pool = pool();
    pool.registry
        .register("ultimate_fast", "ultimate")
        .await
        .unwrap();
    pool.registry.register("pro_slow", "pro").await.unwrap();

    let first = pool.engine.reserve_at(T0).await.unwrap().unwrap();
    let second = pool.engine.reserve_at(T0).await.unwrap().unwrap();
    assert_ne!(first.subscription_id, second.subscription_id);

    // 180 ms later only the ultimate key (170 ms spacing) is eligible
    // again; the pro key stays cooled down until T0 + 860.
    let third = pool.engine.reserve_at(T0 + 180).await.unwrap().unwrap();
    assert_eq!(third.subscription_id, "ultimate_fast");
}

#[tokio::test]
async fn window_saturates_and_rolls_over() {
    let pool = pool();
    pool.registry
        .register("ultimate_fast", "ultimate")
        .await
        .unwrap();

    // 170 spaced reservations fit inside one 30 s window.
    for i in 0..170u64 {
        let at = T0 + i * 170;
        assert!(
            pool.engine.reserve_at(at).await.unwrap().is_some(),
            "reservation {i} should succeed"
        );
    }

    let key = pool.store.find_one("ultimate_fast").await.unwrap().unwrap();
    assert_eq!(key.used_in_window, 170);
    assert_eq!(key.window_start, T0);

    // Spacing has elapsed but the window is full.
    assert!(pool.engine.reserve_at(T0 + 28_900).await.unwrap().is_none());
    assert!(pool.engine.reserve_at(T0 + 29_999).await.unwrap().is_none());

    // Past the window anchor the counter starts over.
    let rolled = pool
        .engine
        .reserve_at(T0 + WINDOW_MS)
        .await
        .unwrap()
        .expect("window has rolled");
    assert_eq!(rolled.subscription_id, "ultimate_fast");

    let key = pool.store.find_one("ultimate_fast").await.unwrap().unwrap();
    assert_eq!(key.used_in_window, 1);
    assert_eq!(key.window_start, T0 + WINDOW_MS);
}

#[tokio::test]
async fn full_window_blocks_regardless_of_spacing() {
    let pool = pool();
    pool.registry.register("sub_pro_test", "pro").await.unwrap();
    pool.store
        .update_one(
            &KeyFilter::id("sub_pro_test"),
            &KeyUpdate {
                used_in_window: Some(35),
                window_start: Some(T0),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(pool.engine.reserve_at(T0 + 10_000).await.unwrap().is_none());
    // The same pool becomes reservable once the window expires.
    assert!(pool
        .engine
        .reserve_at(T0 + WINDOW_MS)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn crossing_the_daily_limit_exhausts_the_key() {
    let pool = pool();
    pool.registry.register("sub_pro_test", "pro").await.unwrap();
    pool.store
        .update_one(
            &KeyFilter::id("sub_pro_test"),
            &KeyUpdate {
                used_daily: Some(99_999),
                day_start: Some(T0),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // The 100 000th reservation succeeds and flips the key.
    let last = pool.engine.reserve_at(T0 + 1).await.unwrap().unwrap();
    assert_eq!(last.subscription_id, "sub_pro_test");

    let key = pool.store.find_one("sub_pro_test").await.unwrap().unwrap();
    assert_eq!(key.status, KeyStatus::Exhausted);
    assert_eq!(key.used_daily, 100_000);

    // Exhausted keys are skipped even after the spacing floor.
    assert!(pool.engine.reserve_at(T0 + 5_000).await.unwrap().is_none());

    // The day sweep reactivates it once the period has elapsed.
    let sweeper = Sweeper::new(pool.store.clone());
    sweeper.sweep_days(T0 + DAY_MS).await.unwrap();
    let revived = pool
        .engine
        .reserve_at(T0 + DAY_MS + 1)
        .await
        .unwrap()
        .expect("reactivated key is selectable");
    assert_eq!(revived.subscription_id, "sub_pro_test");
}

#[tokio::test]
async fn stale_daily_counter_is_flipped_on_read() {
    let pool = pool();
    pool.registry.register("sub_pro_test", "pro").await.unwrap();
    // A counter at the limit that never got its status write.
    pool.store
        .update_one(
            &KeyFilter::id("sub_pro_test"),
            &KeyUpdate {
                used_daily: Some(100_000),
                day_start: Some(T0),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(pool.engine.reserve_at(T0 + 1).await.unwrap().is_none());

    let key = pool.store.find_one("sub_pro_test").await.unwrap().unwrap();
    assert_eq!(key.status, KeyStatus::Exhausted);
}

#[tokio::test]
async fn banned_keys_are_never_selected() {
    let pool = pool();
    pool.registry.register("sub_banned", "ultimate").await.unwrap();
    pool.store
        .update_one(
            &KeyFilter::id("sub_banned"),
            &KeyUpdate {
                status: Some(KeyStatus::Banned),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(pool.engine.reserve_at(T0).await.unwrap().is_none());

    // Not even a full day rollover brings a banned key back.
    let sweeper = Sweeper::new(pool.store.clone());
    sweeper.sweep_days(T0 + DAY_MS).await.unwrap();
    assert!(pool
        .engine
        .reserve_at(T0 + DAY_MS + 1)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn least_used_key_is_preferred() {
    let pool = pool();
    pool.registry.register("sub_a", "ultimate").await.unwrap();
    pool.registry.register("sub_b", "ultimate").await.unwrap();
    pool.store
        .update_one(
            &KeyFilter::id("sub_a"),
            &KeyUpdate {
                used_in_window: Some(5),
                window_start: Some(T0),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let reservation = pool.engine.reserve_at(T0 + 1).await.unwrap().unwrap();
    assert_eq!(reservation.subscription_id, "sub_b");
}

#[tokio::test]
async fn plan_change_keeps_usage_state() {
    let pool = pool();
    pool.registry.register("sub_pro_test", "pro").await.unwrap();
    assert!(pool.engine.reserve_at(T0).await.unwrap().is_some());

    pool.registry
        .register("sub_pro_test", "ultimate")
        .await
        .unwrap();

    let status = pool.registry.list_status().await.unwrap();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].used_in_window, 1);
    assert_eq!(status[0].used_daily, 1);
    assert_eq!(status[0].avg_interval_ms, 170);
    assert_eq!(status[0].window_limit, 170);
    assert_eq!(status[0].last_used, T0);
}

#[tokio::test]
async fn concurrent_reservers_get_exactly_one_key() {
    let store = MemoryStore::new();
    let registry = KeyRegistry::new(store.clone(), PlanPolicy::default());
    registry.register("sub_contended", "pro").await.unwrap();
    let engine = Arc::new(ReservationEngine::new(store));

    let mut handles = vec![];
    for _ in 0..20 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move { engine.reserve().await }));
    }

    let mut reserved = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().is_some() {
            reserved += 1;
        }
    }

    // One key, fresh window, spacing floor 860 ms: a single winner.
    assert_eq!(reserved, 1);
}

#[tokio::test]
async fn empty_pool_reports_none() {
    let pool = pool();
    assert!(pool.engine.reserve_at(T0).await.unwrap().is_none());
    assert!(pool.engine.reserve().await.unwrap().is_none());
}
