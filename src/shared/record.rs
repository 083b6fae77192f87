//! Persisted form records and the metadata derived from them.
//!
//! One record exists per `(owner_id, form_id)` key. A record past its
//! `expires_at` is treated as absent everywhere.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Composite record key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub owner_id: String,
    pub form_id: String,
}

impl RecordKey {
    pub fn new(owner_id: impl Into<String>, form_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            form_id: form_id.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner_id, self.form_id)
    }
}

/// Per-record sync state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Local payload not yet accepted by the server
    Pending,
    /// Server holds the current payload
    Synced,
    /// Pending, and the last attempt failed
    Failed,
}

/// A stored form snapshot with its expiry and sync bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub key: RecordKey,
    pub payload: Value,
    pub saved_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub synced_at: Option<DateTime<Utc>>,
    pub sync_pending: bool,
    /// Fingerprint of `payload`
    pub payload_fingerprint: String,
    /// Fingerprint of the payload the server last accepted
    pub synced_fingerprint: Option<String>,
    /// Message from the last failed sync attempt
    pub last_sync_error: Option<String>,
}

impl PersistedRecord {
    /// A record is usable only while `now < expires_at`
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn sync_state(&self) -> SyncState {
        match (self.sync_pending, &self.last_sync_error) {
            (false, _) => SyncState::Synced,
            (true, Some(_)) => SyncState::Failed,
            (true, None) => SyncState::Pending,
        }
    }
}

/// Expiry of a live record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationInfo {
    pub expires_at: DateTime<Utc>,
}

/// What a save did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub saved_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub sync_pending: bool,
    /// `false` when the stored payload was already identical
    pub changed: bool,
    /// Sync state of the stored record after the write
    pub sync_state: SyncState,
    /// Failure message carried over from the last push, while still pending
    pub last_sync_error: Option<String>,
}

/// Store-wide counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Rows still live
    pub live_records: u64,
    /// Live rows waiting for sync
    pub pending_sync: u64,
    /// Rows past expiry not yet purged
    pub expired_records: u64,
}

/// Read-only state the UI renders save and sync indicators from
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormMetadata {
    pub last_saved: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub has_persisted_data: bool,
    pub is_dirty: bool,
    pub sync_pending: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub sync_state: Option<SyncState>,
    /// Last save or sync failure, cleared by the next success
    pub last_error: Option<String>,
    /// Autosave stopped after repeated storage failures
    pub autosave_suspended: bool,
}

impl FormMetadata {
    /// Metadata mirroring a stored record
    pub fn from_record(record: &PersistedRecord) -> Self {
        Self {
            last_saved: Some(record.saved_at),
            last_synced_at: record.synced_at,
            has_persisted_data: true,
            is_dirty: false,
            sync_pending: record.sync_pending,
            expires_at: Some(record.expires_at),
            sync_state: Some(record.sync_state()),
            last_error: record.last_sync_error.clone(),
            autosave_suspended: false,
        }
    }
}
