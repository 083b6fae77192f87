//! Database test fixtures and utilities
//!
//! Provides an on-disk SQLite store in a temporary directory. Reopening the
//! same path stands in for a page reload or an app restart.

use std::path::PathBuf;
use std::sync::Arc;

use formstash::local_db::LocalDatabase;
use formstash::shared::{Clock, StoreConfig};
use tempfile::TempDir;

/// Test database fixture
///
/// The directory, and the database file in it, is deleted when the
/// fixture drops.
pub struct TestDatabase {
    dir: TempDir,
}

impl TestDatabase {
    /// Create a new, empty database directory
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().join("forms.db")
    }

    pub fn config(&self) -> StoreConfig {
        StoreConfig::at(self.path())
    }

    /// Open (or reopen) the database file
    pub async fn open(&self) -> LocalDatabase {
        LocalDatabase::open(&self.config())
            .await
            .expect("Failed to open test database")
    }

    /// Open with an injected clock
    pub async fn open_with_clock(&self, clock: Arc<dyn Clock>) -> LocalDatabase {
        self.open().await.with_clock(clock)
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}
