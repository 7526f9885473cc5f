//! Per-wallet exclusive locks
//!
//! Every mutating ledger operation holds the lock of each wallet it touches
//! from the first read until the write is committed. Multi-wallet operations
//! lock in ascending user-id order so opposite-direction transfers cannot
//! deadlock, and acquisition gives up after a bounded wait. An entry is
//! dropped again once nobody holds or waits on it.

use crate::{Error, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Registry of wallet locks, created lazily per user
#[derive(Debug, Default)]
pub struct WalletLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl WalletLocks {
    /// Create empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for a user (not yet acquired)
    pub fn handle(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Handles for several users, sorted by user id and deduplicated
    pub fn ordered_handles(&self, user_ids: &[&str]) -> Vec<(String, Arc<Mutex<()>>)> {
        let mut ids: Vec<&str> = user_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter()
            .map(|id| (id.to_string(), self.handle(id)))
            .collect()
    }

    /// Run `f` while holding the locks of every user in `user_ids`
    ///
    /// Locks are taken in user-id order and released before stale entries
    /// are removed from the registry.
    pub fn with_locked<T>(
        &self,
        user_ids: &[&str],
        timeout: Duration,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let handles = self.ordered_handles(user_ids);

        let result = (|| {
            let mut guards = Vec::with_capacity(handles.len());
            for (user_id, lock) in &handles {
                guards.push(acquire(lock, user_id, timeout)?);
            }
            f()
        })();

        let ids: Vec<String> = handles.into_iter().map(|(id, _)| id).collect();
        for id in &ids {
            self.release(id);
        }
        result
    }

    /// Drop the entry for `user_id` if no handle to it is alive
    fn release(&self, user_id: &str) {
        self.locks
            .remove_if(user_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Number of users with a lock entry
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no lock has been handed out yet
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Acquire `lock` within `timeout`, failing with `Busy`
pub fn acquire<'a>(
    lock: &'a Mutex<()>,
    user_id: &str,
    timeout: Duration,
) -> Result<parking_lot::MutexGuard<'a, ()>> {
    lock.try_lock_for(timeout).ok_or_else(|| {
        tracing::warn!(user_id, timeout_ms = timeout.as_millis() as u64, "Wallet lock timeout");
        Error::Busy(user_id.to_string())
    })
}
