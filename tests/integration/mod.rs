//! Integration tests
//!
//! - `database`: the SQLite store on disk
//! - `sync`: the HTTP endpoint and reconnect handling
//! - `forms`: the `OfflineForm` surface end to end

pub mod forms;
