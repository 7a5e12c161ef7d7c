// tests/sweeper.rs
//
// TTL eviction: one-shot sweeps with an injected clock, and the background
// loop's lifecycle.

use chrono::{DateTime, Utc};
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use clip_fetcher::retention::RetentionStore;
use clip_fetcher::{Artifact, Sweeper, SweeperState};

fn put_at(store: &RetentionStore, created_at: DateTime<Utc>) -> Artifact {
    let alloc = store.allocate();
    fs::write(&alloc.final_path, b"x").unwrap();
    store
        .put(Artifact {
            id: alloc.id,
            file_path: alloc.final_path,
            created_at,
            size_bytes: Some(1),
        })
        .unwrap()
}

#[test]
fn only_artifacts_past_ttl_are_removed() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RetentionStore::new(dir.path()).unwrap());
    let now = Utc::now();
    // oldest first: put clamps created_at to be monotonic
    let old = put_at(&store, now - chrono::Duration::seconds(400));
    let fresh = put_at(&store, now - chrono::Duration::seconds(10));

    let sweeper = Sweeper::new(store.clone(), Duration::from_secs(300), Duration::from_secs(300));
    let report = sweeper.sweep_once(now);

    assert_eq!(report.scanned, 2);
    assert_eq!(report.removed, 1);
    assert_eq!(report.failed, 0);
    assert!(store.get(&old.id).is_err());
    assert!(!old.file_path.exists());
    assert!(store.get(&fresh.id).is_ok());
    assert!(fresh.file_path.exists());
}

#[test]
fn artifact_fetchable_until_ttl_then_gone() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RetentionStore::new(dir.path()).unwrap());
    let t0 = Utc::now();
    let a = put_at(&store, t0);
    let sweeper = Sweeper::new(store.clone(), Duration::from_secs(300), Duration::from_secs(300));

    sweeper.sweep_once(t0 + chrono::Duration::seconds(60));
    assert!(store.get(&a.id).is_ok(), "still retained at t0+60s");

    sweeper.sweep_once(t0 + chrono::Duration::seconds(301));
    assert!(store.get(&a.id).is_err(), "evicted after the ttl");
    assert!(!a.file_path.exists());
}

#[test]
fn sweeping_an_empty_store_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RetentionStore::new(dir.path()).unwrap());
    let sweeper = Sweeper::new(store, Duration::from_secs(1), Duration::from_secs(1));
    assert_eq!(sweeper.sweep_once(Utc::now()).scanned, 0);
}

#[tokio::test]
async fn background_loop_evicts_and_stops_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RetentionStore::new(dir.path()).unwrap());
    let stale = put_at(&store, Utc::now() - chrono::Duration::seconds(3600));

    let handle = Sweeper::new(store.clone(), Duration::from_secs(60), Duration::from_secs(3600)).spawn();
    let mut state = handle.state();

    // first scan runs immediately, then the loop parks in Sleeping
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == SweeperState::Sleeping),
    )
    .await
    .expect("sweeper reaches Sleeping")
    .unwrap();
    assert!(store.get(&stale.id).is_err());

    let mut after = handle.state();
    tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
        .await
        .expect("shutdown completes");
    assert_eq!(*after.borrow_and_update(), SweeperState::Stopped);
}

#[tokio::test(flavor = "current_thread")]
async fn async_sweep_runs_off_the_runtime_thread() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RetentionStore::new(dir.path()).unwrap());
    let old = Utc::now() - chrono::Duration::seconds(3600);
    for _ in 0..64 {
        put_at(&store, old);
    }
    let sweeper = Sweeper::new(store.clone(), Duration::from_secs(60), Duration::from_secs(60));

    // a task on the single runtime thread keeps ticking while files are unlinked
    let ticker = tokio::spawn(async {
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        true
    });
    let report = sweeper.sweep(Utc::now()).await;

    assert_eq!(report.removed, 64);
    assert!(store.is_empty());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    assert!(ticker.await.unwrap());
}
