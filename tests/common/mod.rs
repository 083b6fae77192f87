//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - On-disk SQLite fixtures
//! - wiremock sync endpoint helpers
//! - Store and endpoint doubles
//! - Custom assertion macros

pub mod assertions;
pub mod database;
pub mod mock_server;

// Re-export commonly used utilities
pub use database::*;
pub use doubles::*;
pub use mock_server::*;
