//! Shared Module
//!
//! Types used by every layer of the persistence engine: the record model,
//! the dirty tracker, configuration, the error taxonomy and the clock.
//! Nothing in here performs I/O.

/// Error taxonomy
pub mod error;

/// Form and store configuration
pub mod config;

/// Record keys, persisted records, metadata
pub mod record;

/// Canonical snapshots and dirty tracking
pub mod snapshot;

/// Injectable time source
pub mod clock;

/// Re-export commonly used types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, FormConfig, FormConfigBuilder, StoreConfig};
pub use error::{FailureReason, FormError, FormResult};
pub use record::{
    ExpirationInfo, FormMetadata, PersistedRecord, RecordKey, SaveOutcome, StoreStats, SyncState,
};
pub use snapshot::DirtyTracker;
