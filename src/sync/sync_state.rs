//! # Sync In-Flight Tracking
//!
//! At most one sync per record key runs at a time. A second attempt for a
//! key that is already being pushed is refused instead of queued, so the
//! endpoint never receives the same submission twice.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

use crate::shared::error::{FormError, FormResult};
use crate::shared::record::RecordKey;

/// Result of a confirmed sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReceipt {
    pub synced_at: DateTime<Utc>,
    /// Fingerprint of the payload the server accepted
    pub fingerprint: String,
    /// A newer local save landed while the push was in flight
    pub still_pending: bool,
}

/// Keys with a sync currently running
#[derive(Debug, Default)]
pub struct InFlightSyncs {
    keys: Mutex<HashSet<RecordKey>>,
}

impl InFlightSyncs {
    /// Claim `key`; fails with `SyncInFlight` if already claimed
    pub fn begin(&self, key: &RecordKey) -> FormResult<InFlightGuard<'_>> {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        if !keys.insert(key.clone()) {
            return Err(FormError::SyncInFlight);
        }
        Ok(InFlightGuard {
            owner: self,
            key: key.clone(),
        })
    }

    pub fn is_in_flight(&self, key: &RecordKey) -> bool {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

/// Releases the key when dropped
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    owner: &'a InFlightSyncs,
    key: RecordKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.owner
            .keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}
