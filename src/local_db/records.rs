//! # Form Record Operations
//!
//! SQL behind [`FormStore`] for [`LocalDatabase`]. Timestamps are stored as
//! Unix milliseconds so expiry checks are plain integer comparisons.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use formstash::local_db::{FormStore, LocalDatabase};
//! use formstash::shared::RecordKey;
//!
//! # async fn example() -> formstash::shared::FormResult<()> {
//! let db = LocalDatabase::in_memory().await?;
//! let key = RecordKey::new("42", "deal-edit");
//!
//! if db.exists(&key).await? {
//!     let info = db.expiration_info(&key).await?;
//!     println!("draft expires at {:?}", info);
//! }
//! let purged = db.purge_expired().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};

use crate::local_db::{apply_synced, next_record, FormStore, LocalDatabase};
use crate::shared::error::{FormError, FormResult};
use crate::shared::record::{ExpirationInfo, PersistedRecord, RecordKey, SaveOutcome, StoreStats};

const RECORD_COLUMNS: &str = "owner_id, form_id, payload, payload_fingerprint, saved_at, expires_at,
     synced_at, synced_fingerprint, sync_pending, last_sync_error";

impl LocalDatabase {
    /// Read-modify-write transaction holding the write lock from the start.
    ///
    /// In WAL mode a deferred transaction that has already read gets
    /// SQLITE_BUSY_SNAPSHOT on its first write instead of waiting out the
    /// busy timeout.
    pub(crate) async fn begin_write(&self) -> FormResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Row for `key` regardless of expiry
    async fn fetch_any(
        tx: &mut Transaction<'_, Sqlite>,
        key: &RecordKey,
    ) -> FormResult<Option<PersistedRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM form_records WHERE owner_id = ? AND form_id = ?",
            RECORD_COLUMNS
        ))
        .bind(&key.owner_id)
        .bind(&key.form_id)
        .fetch_optional(&mut **tx)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn write_record(
        tx: &mut Transaction<'_, Sqlite>,
        record: &PersistedRecord,
    ) -> FormResult<()> {
        let payload = serde_json::to_string(&record.payload)?;
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO form_records ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            RECORD_COLUMNS
        ))
        .bind(&record.key.owner_id)
        .bind(&record.key.form_id)
        .bind(payload)
        .bind(&record.payload_fingerprint)
        .bind(record.saved_at.timestamp_millis())
        .bind(record.expires_at.timestamp_millis())
        .bind(record.synced_at.map(|t| t.timestamp_millis()))
        .bind(&record.synced_fingerprint)
        .bind(record.sync_pending)
        .bind(&record.last_sync_error)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn delete_expired_key(&self, key: &RecordKey, now: DateTime<Utc>) -> FormResult<()> {
        sqlx::query("DELETE FROM form_records WHERE owner_id = ? AND form_id = ? AND expires_at <= ?")
            .bind(&key.owner_id)
            .bind(&key.form_id)
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl FormStore for LocalDatabase {
    async fn save(&self, key: &RecordKey, payload: &Value, ttl: Duration) -> FormResult<SaveOutcome> {
        let now = self.now();
        let mut tx = self.begin_write().await?;

        let existing = Self::fetch_any(&mut tx, key).await?;
        let (record, outcome) = next_record(existing, key, payload, ttl, now);
        Self::write_record(&mut tx, &record).await?;
        tx.commit().await?;

        tracing::debug!(key = %key, changed = outcome.changed, sync_pending = outcome.sync_pending, "saved form record");
        Ok(outcome)
    }

    async fn load(&self, key: &RecordKey) -> FormResult<Option<Value>> {
        Ok(self.record(key).await?.map(|record| record.payload))
    }

    async fn record(&self, key: &RecordKey) -> FormResult<Option<PersistedRecord>> {
        let now = self.now();
        let row = sqlx::query(&format!(
            "SELECT {} FROM form_records WHERE owner_id = ? AND form_id = ?",
            RECORD_COLUMNS
        ))
        .bind(&key.owner_id)
        .bind(&key.form_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let record = row_to_record(&row)?;
        if record.is_live(now) {
            return Ok(Some(record));
        }

        tracing::debug!(key = %key, "dropping expired form record");
        self.delete_expired_key(key, now).await?;
        Ok(None)
    }

    async fn remove(&self, key: &RecordKey) -> FormResult<()> {
        sqlx::query("DELETE FROM form_records WHERE owner_id = ? AND form_id = ?")
            .bind(&key.owner_id)
            .bind(&key.form_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn exists(&self, key: &RecordKey) -> FormResult<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM form_records WHERE owner_id = ? AND form_id = ? AND expires_at > ?",
        )
        .bind(&key.owner_id)
        .bind(&key.form_id)
        .bind(self.now().timestamp_millis())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn expiration_info(&self, key: &RecordKey) -> FormResult<Option<ExpirationInfo>> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT expires_at FROM form_records WHERE owner_id = ? AND form_id = ? AND expires_at > ?",
        )
        .bind(&key.owner_id)
        .bind(&key.form_id)
        .bind(self.now().timestamp_millis())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((millis,)) => Ok(Some(ExpirationInfo {
                expires_at: from_millis(millis)?,
            })),
            None => Ok(None),
        }
    }

    async fn mark_synced(&self, key: &RecordKey, fingerprint: &str) -> FormResult<Option<PersistedRecord>> {
        let now = self.now();
        let mut tx = self.begin_write().await?;

        let Some(mut record) = Self::fetch_any(&mut tx, key).await?.filter(|r| r.is_live(now)) else {
            return Ok(None);
        };
        apply_synced(&mut record, fingerprint, now);
        Self::write_record(&mut tx, &record).await?;
        tx.commit().await?;
        Ok(Some(record))
    }

    async fn record_sync_failure(&self, key: &RecordKey, message: &str) -> FormResult<()> {
        sqlx::query(
            "UPDATE form_records SET last_sync_error = ?
             WHERE owner_id = ? AND form_id = ? AND expires_at > ? AND sync_pending = 1",
        )
        .bind(message)
        .bind(&key.owner_id)
        .bind(&key.form_id)
        .bind(self.now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> FormResult<u64> {
        let result = sqlx::query("DELETE FROM form_records WHERE expires_at <= ?")
            .bind(self.now().timestamp_millis())
            .execute(&self.pool)
            .await?;

        let purged = result.rows_affected();
        if purged > 0 {
            tracing::info!(purged, "purged expired form records");
        }
        Ok(purged)
    }

    async fn list_for_owner(&self, owner_id: &str) -> FormResult<Vec<PersistedRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM form_records
             WHERE owner_id = ? AND expires_at > ?
             ORDER BY saved_at DESC",
            RECORD_COLUMNS
        ))
        .bind(owner_id)
        .bind(self.now().timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn stats(&self) -> FormResult<StoreStats> {
        let now = self.now().timestamp_millis();
        let (live, pending, expired): (i64, i64, i64) = sqlx::query_as(
            "SELECT
                COALESCE(SUM(CASE WHEN expires_at > ? THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN expires_at > ? AND sync_pending = 1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN expires_at <= ? THEN 1 ELSE 0 END), 0)
             FROM form_records",
        )
        .bind(now)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreStats {
            live_records: live as u64,
            pending_sync: pending as u64,
            expired_records: expired as u64,
        })
    }
}

/// Convert database row to PersistedRecord
fn row_to_record(row: &SqliteRow) -> FormResult<PersistedRecord> {
    let payload: String = row.try_get("payload")?;
    let synced_at: Option<i64> = row.try_get("synced_at")?;

    Ok(PersistedRecord {
        key: RecordKey::new(
            row.try_get::<String, _>("owner_id")?,
            row.try_get::<String, _>("form_id")?,
        ),
        payload: serde_json::from_str(&payload)
            .map_err(|e| FormError::storage(format!("corrupt payload: {}", e)))?,
        payload_fingerprint: row.try_get("payload_fingerprint")?,
        saved_at: from_millis(row.try_get("saved_at")?)?,
        expires_at: from_millis(row.try_get("expires_at")?)?,
        synced_at: synced_at.map(from_millis).transpose()?,
        synced_fingerprint: row.try_get("synced_fingerprint")?,
        sync_pending: row.try_get("sync_pending")?,
        last_sync_error: row.try_get("last_sync_error")?,
    })
}

fn from_millis(millis: i64) -> FormResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| FormError::storage(format!("timestamp out of range: {}", millis)))
}
