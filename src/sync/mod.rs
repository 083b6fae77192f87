//! # Sync Reconciler
//!
//! Moves a locally persisted record to the remote endpoint and clears its
//! `sync_pending` flag only once the server confirmed that exact payload.
//!
//! ## Policy
//!
//! - Offline short-circuit: while the [`NetworkMonitor`] reports offline,
//!   a sync fails with [`FormError::Offline`] before touching the network.
//! - No background retry loop. A failed push leaves the record pending with
//!   the error remembered; the next manual trigger or the next reconnect
//!   event tries again, once.
//! - One sync per key at a time; a concurrent duplicate gets
//!   [`FormError::SyncInFlight`].
//! - A save that lands while a push is in flight keeps the record pending:
//!   the confirmation is matched against the payload fingerprint.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use formstash::local_db::MemoryStore;
//! use formstash::shared::RecordKey;
//! use formstash::sync::{HttpSyncEndpoint, NetworkMonitor, SyncReconciler};
//! use std::sync::Arc;
//!
//! # async fn example() -> formstash::shared::FormResult<()> {
//! let endpoint = HttpSyncEndpoint::new("https://deals.example.com/api/forms/sync")?;
//! let reconciler = SyncReconciler::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(endpoint),
//!     NetworkMonitor::default(),
//! );
//! let receipt = reconciler.sync_to_server(&RecordKey::new("42", "deal-edit")).await?;
//! # Ok(())
//! # }
//! ```

pub mod endpoint;
pub mod network_monitor;
pub mod sync_state;

pub use endpoint::{HttpSyncEndpoint, SyncEndpoint};
pub use network_monitor::{NetworkMonitor, NetworkStatus, ReachabilityEvents};
pub use sync_state::{InFlightSyncs, SyncReceipt};

use std::sync::Arc;

use crate::local_db::FormStore;
use crate::shared::error::{FormError, FormResult};
use crate::shared::record::{PersistedRecord, RecordKey};

/// Pushes pending records to the endpoint
#[derive(Debug)]
pub struct SyncReconciler {
    store: Arc<dyn FormStore>,
    endpoint: Arc<dyn SyncEndpoint>,
    network: NetworkMonitor,
    in_flight: InFlightSyncs,
}

impl SyncReconciler {
    pub fn new(
        store: Arc<dyn FormStore>,
        endpoint: Arc<dyn SyncEndpoint>,
        network: NetworkMonitor,
    ) -> Self {
        Self {
            store,
            endpoint,
            network,
            in_flight: InFlightSyncs::default(),
        }
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    pub fn is_syncing(&self, key: &RecordKey) -> bool {
        self.in_flight.is_in_flight(key)
    }

    /// Push the live record for `key` to the endpoint
    pub async fn sync_to_server(&self, key: &RecordKey) -> FormResult<SyncReceipt> {
        self.ensure_online(key)?;
        let _guard = self.in_flight.begin(key)?;

        let record = self.store.record(key).await?.ok_or(FormError::NoRecord)?;
        self.push_and_confirm(record).await
    }

    /// Push only if the record is waiting for sync; `Ok(None)` otherwise
    pub async fn sync_if_pending(&self, key: &RecordKey) -> FormResult<Option<SyncReceipt>> {
        self.ensure_online(key)?;
        let _guard = self.in_flight.begin(key)?;

        match self.store.record(key).await? {
            Some(record) if record.sync_pending => self.push_and_confirm(record).await.map(Some),
            _ => Ok(None),
        }
    }

    /// Terminal submission: push the current payload, then drop the local
    /// record. On failure the record stays so the user can retry.
    pub async fn submit(&self, key: &RecordKey) -> FormResult<SyncReceipt> {
        self.ensure_online(key)?;
        let _guard = self.in_flight.begin(key)?;

        let record = self.store.record(key).await?.ok_or(FormError::NoRecord)?;
        let fingerprint = record.payload_fingerprint.clone();
        if let Err(e) = self.endpoint.push(key, &record.payload).await {
            self.remember_failure(key, &e).await;
            return Err(e);
        }

        self.store.remove(key).await?;
        tracing::info!(key = %key, "form submitted, local draft cleared");
        Ok(SyncReceipt {
            synced_at: chrono::Utc::now(),
            fingerprint,
            still_pending: false,
        })
    }

    fn ensure_online(&self, key: &RecordKey) -> FormResult<()> {
        if self.network.is_online() {
            return Ok(());
        }
        tracing::debug!(key = %key, "offline, sync deferred");
        Err(FormError::Offline)
    }

    async fn push_and_confirm(&self, record: PersistedRecord) -> FormResult<SyncReceipt> {
        let key = &record.key;
        let fingerprint = record.payload_fingerprint.clone();

        if let Err(e) = self.endpoint.push(key, &record.payload).await {
            self.remember_failure(key, &e).await;
            return Err(e);
        }

        // The record may have expired or been discarded mid-push; the server
        // still has the payload, so that is a success.
        let receipt = match self.store.mark_synced(key, &fingerprint).await? {
            Some(updated) => SyncReceipt {
                synced_at: updated.synced_at.unwrap_or_else(chrono::Utc::now),
                fingerprint,
                still_pending: updated.sync_pending,
            },
            None => SyncReceipt {
                synced_at: chrono::Utc::now(),
                fingerprint,
                still_pending: false,
            },
        };
        tracing::info!(key = %key, still_pending = receipt.still_pending, "form synced");
        Ok(receipt)
    }

    async fn remember_failure(&self, key: &RecordKey, error: &FormError) {
        tracing::warn!(key = %key, error = %error, "form sync failed");
        if let Err(store_err) = self.store.record_sync_failure(key, &error.to_string()).await {
            tracing::warn!(key = %key, error = %store_err, "could not record sync failure");
        }
    }
}
