//! Database migration tests
//!
//! Tests to ensure migrations run correctly and the schema is valid

use crate::common::TestDatabase;
use formstash::local_db::schema::CURRENT_SCHEMA_VERSION;

#[tokio::test]
async fn test_migrations_run_successfully() {
    let fixture = TestDatabase::new();
    let db = fixture.open().await;
    assert_eq!(db.schema_version().await.unwrap(), CURRENT_SCHEMA_VERSION);
}

#[tokio::test]
async fn test_form_records_table_exists() {
    let fixture = TestDatabase::new();
    let db = fixture.open().await;

    let result = sqlx::query("SELECT 1 FROM form_records LIMIT 1")
        .execute(db.pool())
        .await;

    assert!(result.is_ok(), "form_records table should exist");
}

#[tokio::test]
async fn test_reopen_keeps_single_migration_row() {
    let fixture = TestDatabase::new();
    fixture.open().await.close().await;
    let db = fixture.open().await;

    let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM schema_migrations")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(rows, CURRENT_SCHEMA_VERSION);
}

#[tokio::test]
async fn test_wal_mode_enabled() {
    let fixture = TestDatabase::new();
    let db = fixture.open().await;

    let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
}
