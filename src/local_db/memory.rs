//! In-process form store.
//!
//! Same semantics as the SQLite store, minus durability across restarts.
//! Useful for forms that opt out of disk persistence and for tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::local_db::{apply_synced, next_record, FormStore};
use crate::shared::clock::{Clock, SystemClock};
use crate::shared::error::FormResult;
use crate::shared::record::{ExpirationInfo, PersistedRecord, RecordKey, SaveOutcome, StoreStats};

/// HashMap-backed form store
#[derive(Debug)]
pub struct MemoryStore {
    records: RwLock<HashMap<RecordKey, PersistedRecord>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            clock,
        }
    }

    async fn live_record(&self, key: &RecordKey) -> Option<PersistedRecord> {
        let now = self.clock.now();
        let records = self.records.read().await;
        records.get(key).filter(|r| r.is_live(now)).cloned()
    }
}

#[async_trait]
impl FormStore for MemoryStore {
    async fn save(&self, key: &RecordKey, payload: &Value, ttl: Duration) -> FormResult<SaveOutcome> {
        let now = self.clock.now();
        let mut records = self.records.write().await;
        let (record, outcome) = next_record(records.remove(key), key, payload, ttl, now);
        records.insert(key.clone(), record);
        Ok(outcome)
    }

    async fn load(&self, key: &RecordKey) -> FormResult<Option<Value>> {
        Ok(self.record(key).await?.map(|r| r.payload))
    }

    async fn record(&self, key: &RecordKey) -> FormResult<Option<PersistedRecord>> {
        let now = self.clock.now();
        let mut records = self.records.write().await;
        match records.get(key) {
            Some(record) if record.is_live(now) => Ok(Some(record.clone())),
            Some(_) => {
                records.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn remove(&self, key: &RecordKey) -> FormResult<()> {
        self.records.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &RecordKey) -> FormResult<bool> {
        Ok(self.live_record(key).await.is_some())
    }

    async fn expiration_info(&self, key: &RecordKey) -> FormResult<Option<ExpirationInfo>> {
        Ok(self.live_record(key).await.map(|r| ExpirationInfo {
            expires_at: r.expires_at,
        }))
    }

    async fn mark_synced(&self, key: &RecordKey, fingerprint: &str) -> FormResult<Option<PersistedRecord>> {
        let now = self.clock.now();
        let mut records = self.records.write().await;
        match records.get_mut(key).filter(|r| r.is_live(now)) {
            Some(record) => {
                apply_synced(record, fingerprint, now);
                Ok(Some(record.clone()))
            }
            None => Ok(None),
        }
    }

    async fn record_sync_failure(&self, key: &RecordKey, message: &str) -> FormResult<()> {
        let now = self.clock.now();
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(key).filter(|r| r.is_live(now) && r.sync_pending) {
            record.last_sync_error = Some(message.to_string());
        }
        Ok(())
    }

    async fn purge_expired(&self) -> FormResult<u64> {
        let now = self.clock.now();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.is_live(now));
        Ok((before - records.len()) as u64)
    }

    async fn list_for_owner(&self, owner_id: &str) -> FormResult<Vec<PersistedRecord>> {
        let now = self.clock.now();
        let records = self.records.read().await;
        let mut owned: Vec<PersistedRecord> = records
            .values()
            .filter(|r| r.key.owner_id == owner_id && r.is_live(now))
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(owned)
    }

    async fn stats(&self) -> FormResult<StoreStats> {
        let now = self.clock.now();
        let records = self.records.read().await;
        let mut stats = StoreStats::default();
        for record in records.values() {
            if record.is_live(now) {
                stats.live_records += 1;
                if record.sync_pending {
                    stats.pending_sync += 1;
                }
            } else {
                stats.expired_records += 1;
            }
        }
        Ok(stats)
    }
}
