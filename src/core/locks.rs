//! Per-account async locks.
//!
//! `CreateTransaction` reads the pending slot of an account and then writes a
//! new row. Holding the account's lock across that read-check-create sequence
//! stops two different gateway transactions for the same account from both
//! seeing an empty slot. Entries are dropped once nobody holds them.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Identifies an account's product slot
pub type AccountKey = (i64, Option<i64>);

/// Registry of per-account locks
#[derive(Debug, Default)]
pub struct AccountLocks {
    locks: AsyncMutex<HashMap<AccountKey, Arc<AsyncMutex<()>>>>,
}

/// Held lock for one account slot, released on drop
pub struct AccountGuard<'a> {
    registry: &'a AccountLocks,
    key: AccountKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl AccountLocks {
    /// Creates an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and takes the lock of `key`.
    ///
    /// Idle entries that a guard drop could not remove are swept here.
    pub async fn acquire(&self, key: AccountKey) -> AccountGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|k, lock| *k == key || Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(key).or_default())
        };
        let guard = lock.lock_owned().await;
        AccountGuard {
            registry: self,
            key,
            guard: Some(guard),
        }
    }

    /// Number of slots currently tracked
    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }

    fn release(&self, key: AccountKey) {
        // Drop cannot await; when the registry is busy the entry stays until the next acquire
        if let Ok(mut locks) = self.locks.try_lock() {
            if locks
                .get(&key)
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
            {
                locks.remove(&key);
            }
        }
    }
}

impl Drop for AccountGuard<'_> {
    fn drop(&mut self) {
        // Release the slot mutex first so the strong count reflects waiters only
        drop(self.guard.take());
        self.registry.release(self.key);
    }
}
