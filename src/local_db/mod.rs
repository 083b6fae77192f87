//! # Local Form Store
//!
//! Durable key-value storage for form snapshots, keyed by
//! `(owner_id, form_id)`. Each record carries its expiry and the bookkeeping
//! the sync layer needs (`sync_pending`, the fingerprint of the payload the
//! server last accepted, the last sync error).
//!
//! ## Architecture
//!
//! - [`FormStore`]: the async contract every store implements
//! - [`LocalDatabase`]: SQLite file via `sqlx`, WAL mode, schema migrations
//! - [`MemoryStore`]: process-local map for ephemeral sessions
//! - `records.rs`: SQL behind `FormStore for LocalDatabase`
//! - `schema.rs`: schema version bookkeeping
//!
//! ## Semantics shared by all stores
//!
//! - Saves are last-writer-wins; there is no merge.
//! - A record with `now >= expires_at` behaves as absent. `load` deletes it
//!   lazily; `purge_expired` deletes in bulk.
//! - A pending change whose record expires before it syncs is lost. The TTL
//!   is a retention bound and wins over unsynced edits.
//! - I/O failures come back as [`FormError::Storage`], never as panics.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use formstash::local_db::{FormStore, LocalDatabase};
//! use formstash::shared::{RecordKey, StoreConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> formstash::shared::FormResult<()> {
//! let db = LocalDatabase::open(&StoreConfig::default()).await?;
//! let key = RecordKey::new("42", "onboarding-individual");
//!
//! db.save(&key, &serde_json::json!({"step": 2}), Duration::from_secs(3600)).await?;
//! let payload = db.load(&key).await?;
//! # Ok(())
//! # }
//! ```

pub mod memory;
pub mod records;
pub mod schema;

pub use memory::MemoryStore;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use crate::shared::clock::{add_duration, Clock, SystemClock};
use crate::shared::config::StoreConfig;
use crate::shared::error::{FormError, FormResult};
use crate::shared::record::{
    ExpirationInfo, PersistedRecord, RecordKey, SaveOutcome, StoreStats,
};
use crate::shared::snapshot::fingerprint;

/// Durable, TTL-aware form snapshot storage
#[async_trait]
pub trait FormStore: Send + Sync + std::fmt::Debug {
    /// Write `payload` under `key`, stamping `saved_at = now` and
    /// `expires_at = now + ttl`
    async fn save(&self, key: &RecordKey, payload: &Value, ttl: Duration) -> FormResult<SaveOutcome>;

    /// Payload of the live record, `None` if absent or expired
    async fn load(&self, key: &RecordKey) -> FormResult<Option<Value>>;

    /// Full live record, `None` if absent or expired
    async fn record(&self, key: &RecordKey) -> FormResult<Option<PersistedRecord>>;

    /// Delete unconditionally; succeeds when nothing was stored
    async fn remove(&self, key: &RecordKey) -> FormResult<()>;

    /// Whether a live record exists, without deserializing it
    async fn exists(&self, key: &RecordKey) -> FormResult<bool>;

    async fn expiration_info(&self, key: &RecordKey) -> FormResult<Option<ExpirationInfo>>;

    /// Record that the server accepted the payload with `fingerprint`.
    ///
    /// `sync_pending` clears only if the stored payload still has that
    /// fingerprint. Returns the updated record, `None` if it is gone.
    async fn mark_synced(&self, key: &RecordKey, fingerprint: &str) -> FormResult<Option<PersistedRecord>>;

    /// Remember a failed sync attempt; the record stays pending
    async fn record_sync_failure(&self, key: &RecordKey, message: &str) -> FormResult<()>;

    /// Physically delete expired records, returning how many went
    async fn purge_expired(&self) -> FormResult<u64>;

    /// Live records of one owner, most recently saved first
    async fn list_for_owner(&self, owner_id: &str) -> FormResult<Vec<PersistedRecord>>;

    async fn stats(&self) -> FormResult<StoreStats>;
}

/// Compute the record a save produces on top of what is stored.
///
/// An expired predecessor counts as absent, so its sync history is dropped.
pub(crate) fn next_record(
    existing: Option<PersistedRecord>,
    key: &RecordKey,
    payload: &Value,
    ttl: Duration,
    now: DateTime<Utc>,
) -> (PersistedRecord, SaveOutcome) {
    let payload_fingerprint = fingerprint(payload);
    let live = existing.filter(|r| r.is_live(now));

    let changed = live
        .as_ref()
        .map_or(true, |r| r.payload_fingerprint != payload_fingerprint);
    let (synced_at, synced_fingerprint, previous_error) = match live {
        Some(r) => (r.synced_at, r.synced_fingerprint, r.last_sync_error),
        None => (None, None, None),
    };
    let sync_pending = synced_fingerprint.as_deref() != Some(payload_fingerprint.as_str());

    let record = PersistedRecord {
        key: key.clone(),
        payload: payload.clone(),
        saved_at: now,
        expires_at: add_duration(now, ttl),
        synced_at,
        synced_fingerprint,
        sync_pending,
        payload_fingerprint,
        last_sync_error: if sync_pending { previous_error } else { None },
    };
    let outcome = SaveOutcome {
        saved_at: record.saved_at,
        expires_at: record.expires_at,
        sync_pending,
        changed,
        sync_state: record.sync_state(),
        last_sync_error: record.last_sync_error.clone(),
    };
    (record, outcome)
}

/// Apply a confirmed sync of `fingerprint` to a record
pub(crate) fn apply_synced(record: &mut PersistedRecord, fingerprint: &str, now: DateTime<Utc>) {
    record.synced_at = Some(now);
    record.synced_fingerprint = Some(fingerprint.to_string());
    record.sync_pending = record.payload_fingerprint != fingerprint;
    if !record.sync_pending {
        record.last_sync_error = None;
    }
}

/// SQLite-backed form store
///
/// Manages the connection pool and schema; the `FormStore` operations live
/// in `records.rs`.
#[derive(Debug, Clone)]
pub struct LocalDatabase {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl LocalDatabase {
    /// Open or create the database file named by `config`
    ///
    /// Uses WAL mode for better concurrency and crash safety.
    pub async fn open(config: &StoreConfig) -> FormResult<Self> {
        Self::open_path(&config.db_path).await
    }

    /// Open or create the database file at `path`
    pub async fn open_path(path: &Path) -> FormResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| FormError::storage(format!("{}: {}", parent.display(), e)))?;
            }
        }

        // Pragmas go on the connect options so every pooled connection gets them.
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .pragma("temp_store", "MEMORY");
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        tracing::info!(path = %path.display(), "opened local form store");
        Self::from_pool(pool).await
    }

    /// Private in-memory database, gone when dropped
    pub async fn in_memory() -> FormResult<Self> {
        // Every connection to :memory: is its own database; pin exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> FormResult<Self> {
        let db = Self {
            pool,
            clock: Arc::new(SystemClock),
        };
        db.init_schema().await?;
        Ok(db)
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Get connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Create tables and apply pending migrations
    async fn init_schema(&self) -> FormResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let current_version: (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;

        for version in schema::get_pending_migrations(current_version.0) {
            self.apply_migration(version).await?;
        }
        Ok(())
    }

    async fn apply_migration(&self, version: i64) -> FormResult<()> {
        let sql = schema::migration_sql(version)
            .ok_or_else(|| FormError::storage(format!("unknown schema migration {}", version)))?;

        let mut tx = self.pool.begin().await?;
        sqlx::raw_sql(sql).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(self.now().timestamp_millis())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(version, "applied local store migration");
        Ok(())
    }

    /// Current schema version
    pub async fn schema_version(&self) -> FormResult<i64> {
        let version: (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;
        Ok(version.0)
    }
}
