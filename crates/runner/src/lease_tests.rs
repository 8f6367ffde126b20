// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use af_core::FakeClock;
use af_storage::MemoryStore;
use std::time::Duration;

fn store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

#[tokio::test]
async fn lease_acquires_and_releases_on_drop() {
    let store = store();
    let clock = FakeClock::new();

    let lease = LockLease::acquire(
        Arc::clone(&store) as Arc<dyn Store>,
        "task:1",
        10_000,
        1_000,
        clock.clone(),
    )
    .unwrap()
    .expect("lock free");
    assert_eq!(lease.key(), "task:1");
    assert!(store.get_lock("task:1").unwrap().is_some());

    drop(lease);
    assert!(store.get_lock("task:1").unwrap().is_none());
}

#[tokio::test]
async fn second_acquire_is_refused_while_held() {
    let store = store();
    let clock = FakeClock::new();

    let _lease = LockLease::acquire(
        Arc::clone(&store) as Arc<dyn Store>,
        "task:1",
        10_000,
        1_000,
        clock.clone(),
    )
    .unwrap()
    .expect("lock free");

    let second = LockLease::acquire(
        Arc::clone(&store) as Arc<dyn Store>,
        "task:1",
        10_000,
        1_000,
        clock,
    )
    .unwrap();
    assert!(second.is_none());
}

#[tokio::test]
async fn background_extension_pushes_expiry_forward() {
    let store = store();
    let clock = FakeClock::new();

    let _lease = LockLease::acquire(
        Arc::clone(&store) as Arc<dyn Store>,
        "task:1",
        5_000,
        10, // extend every 10ms of wall time
        clock.clone(),
    )
    .unwrap()
    .expect("lock free");

    let before = store.get_lock("task:1").unwrap().unwrap().expires_at;
    clock.advance_ms(3_000);
    // Give the extend loop a few ticks.
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let now = store.get_lock("task:1").unwrap().unwrap().expires_at;
        if now > before {
            return;
        }
    }
    assert!(false, "lease never extended");
}

#[tokio::test]
async fn expired_lease_is_reclaimable_by_another_runner() {
    let store = store();
    let clock = FakeClock::new();

    let lease = LockLease::acquire(
        Arc::clone(&store) as Arc<dyn Store>,
        "task:1",
        100,
        60_000, // never extends in time
        clock.clone(),
    )
    .unwrap()
    .expect("lock free");

    // The lease lapses without an extension.
    clock.advance_ms(500);
    let reclaimed = LockLease::acquire(
        Arc::clone(&store) as Arc<dyn Store>,
        "task:1",
        10_000,
        60_000,
        clock.clone(),
    )
    .unwrap();
    assert!(reclaimed.is_some(), "expired lock must be reclaimable");

    // Dropping the stale lease releases the key even though ownership
    // moved on; holders must not assume exclusivity past the lease.
    drop(lease);
}
