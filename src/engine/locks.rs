//! Per-contact serialization for cursor read-modify-write.
//!
//! Two near-simultaneous messages from the same contact must not both be
//! evaluated against the same stale cursor, or the dialogue could
//! double-advance. Each contact gets its own async mutex; different
//! contacts proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::crypto::LookupKey;

/// Lock map keyed by contact handle.
#[derive(Default)]
pub struct ContactLocks {
    inner: RwLock<HashMap<LookupKey, Arc<Mutex<()>>>>,
}

impl ContactLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one contact, creating it on first use. The
    /// guard is held for the duration of the state transition.
    pub async fn acquire(&self, key: &LookupKey) -> OwnedMutexGuard<()> {
        // Fast path: lock already exists.
        if let Some(lock) = self.inner.read().await.get(key) {
            return Arc::clone(lock).lock_owned().await;
        }

        let lock = {
            let mut map = self.inner.write().await;
            Arc::clone(
                map.entry(key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    /// Number of contacts with a lock entry (for tests).
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
