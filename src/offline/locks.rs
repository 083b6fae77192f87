//! Per-key write locks.
//!
//! Every save, clear and submit for a record key runs under that key's
//! `tokio::sync::Mutex`. Tokio's mutex is fair, so writes are applied in the
//! order they were issued and the last one issued is the final state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Mutex as AsyncMutex;

use crate::shared::record::RecordKey;

pub type WriteLock = Arc<AsyncMutex<()>>;

/// Lock table shared by every form opened against one store
#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<RecordKey, WriteLock>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for `key`; every caller for the same key gets the same one
    pub fn lock_for(&self, key: &RecordKey) -> WriteLock {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Entries nobody else holds can go.
        locks.retain(|k, lock| k == key || Arc::strong_count(lock) > 1);
        locks.entry(key.clone()).or_default().clone()
    }

    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
