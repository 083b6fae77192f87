//! Database Schema Definitions
//!
//! Contains schema-related constants and the SQL of each migration.

/// Current database schema version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// Schema migration versions
pub const MIGRATION_VERSIONS: &[i64] = &[1];

/// Initial schema
const MIGRATION_1: &str = include_str!("schema.sql");

/// Check if database needs migration
pub fn needs_migration(current_version: i64) -> bool {
    current_version < CURRENT_SCHEMA_VERSION
}

/// Get pending migrations
pub fn get_pending_migrations(current_version: i64) -> Vec<i64> {
    MIGRATION_VERSIONS
        .iter()
        .filter(|&&v| v > current_version)
        .cloned()
        .collect()
}

/// SQL for one migration
pub fn migration_sql(version: i64) -> Option<&'static str> {
    match version {
        1 => Some(MIGRATION_1),
        _ => None,
    }
}
