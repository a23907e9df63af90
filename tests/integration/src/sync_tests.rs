//! Refresh cycles against a table-backed store.

use std::sync::Arc;
use std::time::Duration;

use meshsync::prelude::*;
use meshsync_integration_tests::{seed_grid, PlainKind, TableStore};

fn grid_payload(p: usize, r: usize) -> String {
    format!("payload-{p}-{r}")
}

fn new_cache(store: &Arc<TableStore<PlainKind>>, config: CacheConfig) -> ResourceCache<PlainKind> {
    ResourceCache::<PlainKind>::initialize(config, store.clone()).unwrap()
}

#[tokio::test]
async fn full_load_then_soft_deletes() {
    let store = Arc::new(TableStore::<PlainKind>::default());
    seed_grid(&store, 5, 3, grid_payload);
    let cache = new_cache(&store, CacheConfig::new());

    cache.refresh().await.unwrap();
    assert_eq!(cache.count(), 15);
    assert_eq!(cache.parent_revision_count(), 5);
    assert_eq!(cache.get_by_parent("parent-1").len(), 3);
    assert_eq!(cache.get_last_revision("parent-1"), "last-revision-1");

    store.tick(1);
    for p in 0..5 {
        assert!(store.delete(&format!("id-{p}-0")));
    }
    match cache.refresh().await.unwrap() {
        RefreshOutcome::Applied(summary) => {
            assert!(!summary.first_load);
            assert_eq!(summary.removed, 5);
        }
        other => panic!("expected applied batch, got {}", other.as_str()),
    }
    assert_eq!(cache.count(), 10);
    assert_eq!(cache.parent_revision_count(), 5);
    assert!(cache.get("id-3-0").is_none());
    assert_eq!(cache.get_by_parent("parent-3").len(), 2);
    assert!(cache.verify().is_empty());
}

#[tokio::test]
async fn replaying_deletions_is_idempotent() {
    let store = Arc::new(TableStore::<PlainKind>::default());
    seed_grid(&store, 2, 2, grid_payload);
    let cache = new_cache(&store, CacheConfig::new());
    cache.refresh().await.unwrap();

    store.tick(1);
    store.delete("id-0-0");
    let deleted_at = store.now();
    cache.refresh().await.unwrap();
    assert_eq!(cache.count(), 3);

    // Re-reading from before the deletion hands the same row over again.
    let again = cache
        .refresh_from(Timestamp::from_secs(deleted_at.as_secs() - 1))
        .await
        .unwrap();
    assert!(matches!(again, RefreshOutcome::Applied(_)));
    assert_eq!(cache.count(), 3);
    assert_eq!(cache.stats().invariant_violations(), 0);
}

#[tokio::test]
async fn disjoint_grids_accumulate() {
    let store = Arc::new(TableStore::<PlainKind>::default());
    seed_grid(&store, 5, 3, grid_payload);
    let cache = new_cache(&store, CacheConfig::new());
    cache.refresh().await.unwrap();

    store.tick(1);
    for p in 5..10 {
        let parent = format!("parent-{p}");
        for r in 0..3 {
            store.put(&format!("id-{p}-{r}"), &parent, grid_payload(p, r));
        }
        store.set_revision(&parent, &format!("last-revision-{p}"));
    }
    cache.refresh().await.unwrap();

    assert_eq!(cache.count(), 30);
    assert_eq!(cache.parent_revision_count(), 10);
    assert_eq!(cache.parents().len(), 10);
}

#[tokio::test]
async fn cursor_only_moves_forward() {
    let store = Arc::new(TableStore::<PlainKind>::default());
    let cache = new_cache(&store, CacheConfig::new());

    let mut last = cache.cursor();
    for step in 0..5 {
        store.tick(3);
        store.put(&format!("row-{step}"), "p", "x".to_string());
        cache.refresh().await.unwrap();
        assert!(cache.cursor() >= last);
        last = cache.cursor();
    }
    assert_eq!(last, store.now());

    // Nothing new: the cursor stays put.
    store.tick(10);
    assert_eq!(
        cache.refresh().await.unwrap(),
        RefreshOutcome::Unchanged { first_load: false }
    );
    assert_eq!(cache.cursor(), last);
}

#[tokio::test]
async fn rollback_window_catches_late_commits() {
    let store = Arc::new(TableStore::<PlainKind>::default());
    store.put("early", "p", "x".to_string());
    let with_rollback =
        new_cache(&store, CacheConfig::new().with_store_rollback(Duration::from_secs(5)));
    let without_rollback = new_cache(&store, CacheConfig::new());

    with_rollback.refresh().await.unwrap();
    without_rollback.refresh().await.unwrap();

    store.tick(2);
    store.put("on-time", "p", "y".to_string());
    with_rollback.refresh().await.unwrap();
    without_rollback.refresh().await.unwrap();

    // Committed after the cycle above but stamped before its cursor.
    let stamped = Timestamp::from_secs(store.now().as_secs() - 1);
    store.put_at("late", "p", "z".to_string(), stamped);
    store.tick(1);
    with_rollback.refresh().await.unwrap();
    without_rollback.refresh().await.unwrap();

    assert!(with_rollback.get("late").is_some());
    assert!(without_rollback.get("late").is_none());
    assert_eq!(with_rollback.count(), 3);
}

#[tokio::test]
async fn outage_leaves_cache_untouched() {
    let store = Arc::new(TableStore::<PlainKind>::default());
    seed_grid(&store, 3, 2, grid_payload);
    let cache = new_cache(&store, CacheConfig::new());
    cache.refresh().await.unwrap();
    let cursor = cache.cursor();

    store.tick(1);
    store.delete("id-0-0");
    store.go_offline();

    let err = cache.refresh().await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(cache.count(), 6);
    assert_eq!(cache.parent_revision_count(), 3);
    assert_eq!(cache.cursor(), cursor);
    assert_eq!(cache.stats().cycles_failed(), 1);

    store.restore();
    cache.refresh().await.unwrap();
    assert_eq!(cache.count(), 5);
}

#[tokio::test]
async fn unknown_parent_queries() {
    let store = Arc::new(TableStore::<PlainKind>::default());
    seed_grid(&store, 1, 1, grid_payload);
    let cache = new_cache(&store, CacheConfig::new());
    cache.refresh().await.unwrap();

    assert!(cache.get_by_parent("nobody").is_empty());
    assert!(cache.get_last_revision("nobody").is_empty());
    let mut visited = 0;
    cache
        .iterate("nobody", |_, _| -> Result<bool, SyncError> {
            visited += 1;
            Ok(true)
        })
        .unwrap();
    assert_eq!(visited, 0);
}

#[tokio::test]
async fn revisions_outlive_their_records() {
    let store = Arc::new(TableStore::<PlainKind>::default());
    seed_grid(&store, 1, 2, grid_payload);
    let cache = new_cache(&store, CacheConfig::new());
    cache.refresh().await.unwrap();

    store.tick(1);
    store.delete("id-0-0");
    store.delete("id-0-1");
    store.set_revision("parent-0", "last-revision-0b");
    cache.refresh().await.unwrap();

    assert_eq!(cache.count(), 0);
    assert!(cache.get_by_parent("parent-0").is_empty());
    assert_eq!(cache.get_last_revision("parent-0"), "last-revision-0b");
    assert_eq!(cache.parent_revision_count(), 1);
}

#[tokio::test]
async fn undecodable_rows_do_not_block_the_batch() {
    let store = Arc::new(TableStore::<PlainKind>::default());
    store.put("good-1", "p", "a".to_string());
    store.put("broken", "p", String::new());
    store.put("good-2", "q", "b".to_string());
    let cache = new_cache(&store, CacheConfig::new());

    match cache.refresh().await.unwrap() {
        RefreshOutcome::Applied(summary) => assert_eq!(summary.malformed, 1),
        other => panic!("expected applied batch, got {}", other.as_str()),
    }
    assert_eq!(cache.count(), 2);
    assert_eq!(cache.cursor(), store.now());
    assert_eq!(cache.stats().malformed_records(), 1);
}

#[tokio::test]
async fn reset_forces_full_reload() {
    let store = Arc::new(TableStore::<PlainKind>::default());
    seed_grid(&store, 2, 2, grid_payload);
    let cache = new_cache(&store, CacheConfig::new());
    cache.refresh().await.unwrap();

    store.tick(1);
    store.delete("id-1-1");
    cache.reset();
    assert!(cache.is_first_load());
    assert_eq!(cache.count(), 0);
    assert_eq!(cache.cursor(), Timestamp::ZERO);

    match cache.refresh().await.unwrap() {
        RefreshOutcome::Applied(summary) => assert!(summary.first_load),
        other => panic!("expected full load, got {}", other.as_str()),
    }
    assert_eq!(cache.count(), 3);
    assert!(!cache.is_first_load());
}

#[tokio::test]
async fn copy_on_write_mode_matches_locked_mode() {
    let store = Arc::new(TableStore::<PlainKind>::default());
    seed_grid(&store, 4, 4, grid_payload);
    let locked = new_cache(&store, CacheConfig::new());
    let cow = new_cache(&store, CacheConfig::new().with_index_mode(IndexMode::CopyOnWrite));

    for round in 0..3 {
        store.tick(1);
        store.delete(&format!("id-{round}-{round}"));
        store.put(&format!("extra-{round}"), "parent-9", "e".to_string());
        locked.refresh().await.unwrap();
        cow.refresh().await.unwrap();
    }

    let mut locked_parents = locked.parents();
    let mut cow_parents = cow.parents();
    locked_parents.sort();
    cow_parents.sort();

    assert_eq!(locked.count(), cow.count());
    assert_eq!(locked_parents, cow_parents);
    assert_eq!(locked.cursor(), cow.cursor());
    for parent in locked_parents {
        let mut a: Vec<_> = locked.get_by_parent(&parent).iter().map(|r| r.id().to_string()).collect();
        let mut b: Vec<_> = cow.get_by_parent(&parent).iter().map(|r| r.id().to_string()).collect();
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }
}
