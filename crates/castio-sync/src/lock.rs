//! Keyed mutual exclusion.
//!
//! The identity-conversion path deletes and recreates rows without a
//! multi-row transaction, so no two conversions for the same external id may
//! interleave. [`KeyedLock`] hands out one async mutex per string key;
//! different keys never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A map of async mutexes, one per key. Idle entries are dropped
/// opportunistically on the next acquire.
#[derive(Default)]
pub struct KeyedLock {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLock {
    /// Create an empty lock map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the mutex for a key, waiting if another holder has it.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().expect("keyed lock poisoned");
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            Arc::clone(
                locks
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    /// Number of keys currently tracked; test helper.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.locks.lock().expect("keyed lock poisoned").len()
    }
}
