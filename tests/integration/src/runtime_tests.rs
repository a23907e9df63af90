//! Refresh loops, configuration and shutdown working together.

use std::sync::Arc;
use std::time::Duration;

use meshsync::prelude::*;
use meshsync::resources::RateLimitKind;
use meshsync_integration_tests::{seed_grid, PlainKind, TableStore};

const CONFIG: &str = r#"{
    "defaults": { "refresh_interval_secs": 1, "request_timeout_secs": 2 },
    "resources": {
        "plain": {
            "refresh_interval_secs": 1,
            "index_mode": "copy_on_write",
            "retry": {
                "kind": "exponential",
                "initial_delay_ms": 100,
                "max_delay_ms": 1000,
                "multiplier": 2.0,
                "jitter": false
            }
        }
    },
    "shutdown": { "grace_period_secs": 3 }
}"#;

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached in time");
}

#[test]
fn runtime_config_from_json() {
    let config = RuntimeConfig::from_json(CONFIG).unwrap();
    config.validate().unwrap();

    let plain = config.cache_config(&PlainKind::resource_type());
    assert_eq!(plain.index_mode, IndexMode::CopyOnWrite);
    assert!(matches!(plain.retry, RetryPolicy::Exponential { .. }));

    let rate_limit = config.cache_config(&RateLimitKind::resource_type());
    assert_eq!(rate_limit.index_mode, IndexMode::Locked);
    assert_eq!(rate_limit.request_timeout, Duration::from_secs(2));
    assert_eq!(config.shutdown.grace_period, Duration::from_secs(3));
}

#[tokio::test]
async fn loops_follow_the_store_until_shutdown() {
    let config = RuntimeConfig::from_json(CONFIG).unwrap();
    let store = Arc::new(TableStore::<PlainKind>::default());
    seed_grid(&store, 3, 3, |p, r| format!("v-{p}-{r}"));

    let cache = Arc::new(
        ResourceCache::<PlainKind>::initialize(config.cache_config(&PlainKind::resource_type()), store.clone())
            .unwrap(),
    );
    let manager = CacheManager::new();
    manager.register(cache.clone()).unwrap();

    let shutdown = ShutdownController::new();
    let loops = manager.spawn_all(&shutdown);
    assert_eq!(loops.len(), 1);

    wait_until(|| manager.is_ready()).await;
    assert_eq!(cache.count(), 9);

    store.tick(1);
    store.delete("id-2-2");
    store.put("id-3-0", "parent-3", "v-3-0".to_string());
    store.set_revision("parent-3", "last-revision-3");
    wait_until(|| cache.parent_revision_count() == 4).await;
    assert_eq!(cache.count(), 9);
    assert!(cache.get("id-2-2").is_none());

    assert!(shutdown.shutdown(config.shutdown.grace_period).await);
    for summary in futures::future::join_all(loops).await {
        let summary = summary.unwrap();
        assert!(summary.cycles >= 2);
        assert_eq!(summary.failures, 0);
    }

    // Stopped loops no longer read from the store.
    let fetches = store.fetches();
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    assert_eq!(store.fetches(), fetches);
}

#[tokio::test]
async fn loops_recover_after_an_outage() {
    let store = Arc::new(TableStore::<PlainKind>::default());
    store.go_offline();
    let config = CacheConfig::new()
        .with_refresh_interval(Duration::from_millis(50))
        .with_retry(RetryPolicy::exponential(
            Duration::from_millis(20),
            Duration::from_millis(100),
        ));
    let cache = Arc::new(ResourceCache::<PlainKind>::initialize(config, store.clone()).unwrap());

    let manager = CacheManager::new();
    manager.register(cache.clone()).unwrap();
    let shutdown = ShutdownController::new();
    let loops = manager.spawn_all(&shutdown);

    wait_until(|| cache.stats().cycles_failed() >= 2).await;
    assert!(!manager.is_ready());

    store.put("late", "p", "x".to_string());
    store.restore();
    wait_until(|| manager.is_ready()).await;
    assert_eq!(cache.count(), 1);

    shutdown.shutdown(Duration::from_secs(1)).await;
    let summary = futures::future::join_all(loops).await.remove(0).unwrap();
    assert!(summary.failures >= 2);
    assert!(summary.cycles > summary.failures);
}

#[tokio::test]
async fn reset_all_reloads_through_the_loops() {
    let store = Arc::new(TableStore::<PlainKind>::default());
    seed_grid(&store, 2, 2, |p, r| format!("v-{p}-{r}"));
    let cache = Arc::new(
        ResourceCache::<PlainKind>::initialize(
            CacheConfig::new().with_refresh_interval(Duration::from_millis(30)),
            store.clone(),
        )
        .unwrap(),
    );
    let manager = CacheManager::new();
    manager.register(cache.clone()).unwrap();
    let shutdown = ShutdownController::new();
    let loops = manager.spawn_all(&shutdown);

    wait_until(|| manager.is_ready()).await;
    manager.reset_all();
    wait_until(|| manager.is_ready()).await;

    assert_eq!(cache.count(), 4);
    assert_eq!(cache.stats().resets(), 1);

    shutdown.shutdown(Duration::from_secs(1)).await;
    futures::future::join_all(loops).await;
}
