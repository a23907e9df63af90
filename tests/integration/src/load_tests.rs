//! Load tests with thousands of records and concurrent readers.
//!
//! These tests verify the engine under realistic volumes:
//! - 1000 parents x 10 records in one full load
//! - readers racing refresh cycles never see a half-applied batch
//! - mixed read/refresh workloads in both index modes
//!
//! Run with: `cargo test --package meshsync-integration-tests --test load_tests -- --nocapture`

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use meshsync::prelude::*;
use meshsync_integration_tests::{seed_grid, PlainKind, TableStore};
use tokio::sync::Barrier;

const MODES: [IndexMode; 2] = [IndexMode::Locked, IndexMode::CopyOnWrite];

fn payload(p: usize, r: usize) -> String {
    format!("payload-{p}-{r}")
}

async fn loaded(
    parents: usize,
    per_parent: usize,
    mode: IndexMode,
) -> (Arc<TableStore<PlainKind>>, Arc<ResourceCache<PlainKind>>) {
    let store = Arc::new(TableStore::<PlainKind>::default());
    seed_grid(&store, parents, per_parent, payload);
    let cache = Arc::new(
        ResourceCache::<PlainKind>::initialize(
            CacheConfig::new().with_index_mode(mode),
            store.clone(),
        )
        .unwrap(),
    );
    cache.refresh().await.unwrap();
    (store, cache)
}

/// Rotate one record per parent: delete the oldest, insert a new one.
fn rotate(store: &TableStore<PlainKind>, parents: usize, per_parent: usize, round: usize) {
    store.tick(1);
    for p in 0..parents {
        let parent = format!("parent-{p}");
        store.delete(&format!("id-{p}-{round}"));
        store.put(&format!("id-{p}-{}", round + per_parent), &parent, payload(p, round));
    }
}

#[tokio::test]
async fn test_full_load_1000_parents() {
    for mode in MODES {
        let start = Instant::now();
        let (_store, cache) = loaded(1000, 10, mode).await;
        let load_duration = start.elapsed();

        println!(
            "{mode:?}: full load of {} records in {:?} ({:.2} µs/record)",
            cache.count(),
            load_duration,
            load_duration.as_micros() as f64 / cache.count() as f64
        );

        assert_eq!(cache.count(), 10_000);
        assert_eq!(cache.parent_revision_count(), 1000);

        let start = Instant::now();
        for p in 0..1000 {
            assert_eq!(cache.get_by_parent(&format!("parent-{p}")).len(), 10);
            assert!(cache.get(&format!("id-{p}-9")).is_some());
        }
        println!("{mode:?}: 2000 lookups in {:?}", start.elapsed());

        let stats = cache.stats();
        assert_eq!(stats.query_hits(), 1000);
        assert_eq!(stats.hit_rate(), 1.0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_partial_batches() {
    let parents = 200;
    let per_parent = 10;
    let rounds = 20;

    for mode in MODES {
        let (store, cache) = loaded(parents, per_parent, mode).await;
        let num_readers = 6;
        let barrier = Arc::new(Barrier::new(num_readers + 1));
        let done = Arc::new(AtomicBool::new(false));
        let reads = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::new();
        for reader in 0..num_readers {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            let done = Arc::clone(&done);
            let reads = Arc::clone(&reads);

            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                let mut i = reader;
                while !done.load(Ordering::Acquire) {
                    let parent = format!("parent-{}", i % parents);
                    // Every batch deletes and inserts one record per parent.
                    assert_eq!(cache.get_by_parent(&parent).len(), per_parent);
                    assert_eq!(cache.count(), parents * per_parent);
                    reads.fetch_add(1, Ordering::Relaxed);
                    i += 1;
                    tokio::task::yield_now().await;
                }
            }));
        }

        barrier.wait().await;
        let start = Instant::now();
        for round in 0..rounds {
            rotate(&store, parents, per_parent, round);
            match cache.refresh().await.unwrap() {
                RefreshOutcome::Applied(summary) => {
                    assert_eq!(summary.removed, parents);
                    assert_eq!(summary.upserted, parents);
                }
                other => panic!("{mode:?}: round {round} was {}", other.as_str()),
            }
        }
        done.store(true, Ordering::Release);

        for handle in handles {
            handle.await.expect("reader panicked");
        }

        println!(
            "{mode:?}: {rounds} cycles in {:?} with {} concurrent reads",
            start.elapsed(),
            reads.load(Ordering::Relaxed)
        );
        assert!(cache.verify().is_empty());
        assert_eq!(cache.stats().invariant_violations(), 0);
    }
}

#[tokio::test]
async fn test_mixed_workload() {
    let parents = 500;
    let per_parent = 4;
    let operations = 10_000;

    for mode in MODES {
        let (store, cache) = loaded(parents, per_parent, mode).await;
        let start = Instant::now();
        let mut reads = 0u64;
        let mut cycles = 0usize;

        for i in 0..operations {
            if i % 1000 == 0 {
                rotate(&store, parents, per_parent, cycles);
                cache.refresh().await.unwrap();
                cycles += 1;
            } else {
                let parent = format!("parent-{}", i % parents);
                let _ = cache.get_last_revision(&parent);
                let _ = cache.get_by_parent(&parent);
                reads += 1;
            }
        }

        let duration = start.elapsed();
        println!("{mode:?}: {reads} reads, {cycles} cycles in {duration:?}");
        println!(
            "  Throughput: {:.0} ops/sec",
            operations as f64 / duration.as_secs_f64()
        );

        assert_eq!(cache.count(), parents * per_parent);
        assert_eq!(cache.stats().cycles_succeeded(), cycles as u64 + 1);
    }
}

#[tokio::test]
async fn test_reset_and_reload_5000_records() {
    let (store, cache) = loaded(50, 100, IndexMode::Locked).await;
    rotate(&store, 50, 100, 0);
    cache.refresh().await.unwrap();

    let start = Instant::now();
    cache.reset();
    assert_eq!(cache.count(), 0);
    cache.refresh().await.unwrap();
    println!("Reset and reloaded {} records in {:?}", cache.count(), start.elapsed());

    assert_eq!(cache.count(), store.valid_rows());
    assert_eq!(cache.count(), 5000);
    assert_eq!(cache.parent_revision_count(), 50);
}
