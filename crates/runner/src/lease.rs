// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scoped advisory lock leases for long-running work items.
//!
//! A lease acquires its lock on creation, extends it in the background,
//! and releases it on drop. Holders must still tolerate losing the lock:
//! an extension that finds the lease expired stops renewing, and another
//! runner may take over.

use af_core::Clock;
use af_storage::{Store, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct LockLease {
    store: Arc<dyn Store>,
    key: String,
    cancel: CancellationToken,
}

impl LockLease {
    /// Try to acquire `key` for `duration_ms`, spawning a background task
    /// that extends the lease every `extend_interval_ms`. Returns `None`
    /// when the lock is currently held elsewhere.
    pub fn acquire<C: Clock + 'static>(
        store: Arc<dyn Store>,
        key: impl Into<String>,
        duration_ms: u64,
        extend_interval_ms: u64,
        clock: C,
    ) -> Result<Option<Self>, StoreError> {
        let key = key.into();
        if !store.acquire_lock(&key, duration_ms, None, clock.epoch_ms())? {
            return Ok(None);
        }
        tracing::debug!(key = %key, "lock acquired");

        let cancel = CancellationToken::new();
        let extender = ExtendLoop {
            store: Arc::clone(&store),
            key: key.clone(),
            duration_ms,
            interval: Duration::from_millis(extend_interval_ms),
            clock,
            cancel: cancel.clone(),
        };
        tokio::spawn(extender.run());

        Ok(Some(Self { store, key, cancel }))
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LockLease {
    fn drop(&mut self) {
        self.cancel.cancel();
        match self.store.release_lock(&self.key) {
            Ok(released) => {
                tracing::debug!(key = %self.key, released, "lock released");
            }
            Err(err) => tracing::warn!(key = %self.key, error = %err, "lock release failed"),
        }
    }
}

struct ExtendLoop<C: Clock> {
    store: Arc<dyn Store>,
    key: String,
    duration_ms: u64,
    interval: Duration,
    clock: C,
    cancel: CancellationToken,
}

impl<C: Clock> ExtendLoop<C> {
    async fn run(self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {
                    match self.store.extend_lock(&self.key, self.duration_ms, self.clock.epoch_ms()) {
                        Ok(true) => {}
                        Ok(false) => {
                            // Lease expired out from under us; stop renewing.
                            tracing::warn!(key = %self.key, "lock lease lost");
                            break;
                        }
                        Err(err) => {
                            tracing::warn!(key = %self.key, error = %err, "lock extension failed");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "lease_tests.rs"]
mod tests;
