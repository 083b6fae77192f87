//! Formstash - Offline-Aware Form Persistence
//!
//! Formstash keeps multi-step forms (onboarding flows, deal editors) alive
//! across reloads, network loss and closed windows, then reconciles them
//! with one server copy without losing or duplicating input.
//!
//! # Overview
//!
//! - Durable local drafts keyed by `(owner_id, form_id)` with a TTL
//! - Snapshot-equality dirty tracking so clean forms never write
//! - Interval autosave with a manual "save now" that restarts the timer
//! - Online/offline-aware sync with one retry per reconnect
//! - A resume/discard recovery flow for drafts found on open
//!
//! # Module Structure
//!
//! - **`shared`** - Types used by every layer
//!   - Record model, metadata, error taxonomy
//!   - Configuration, canonical snapshots, clock
//!
//! - **`local_db`** - Persistence store
//!   - `FormStore` trait
//!   - SQLite store with schema migrations
//!   - In-memory store
//!
//! - **`sync`** - Talking to the server
//!   - Reachability monitor
//!   - HTTP sync endpoint
//!   - Sync reconciler with in-flight suppression
//!
//! - **`offline`** - What the application uses
//!   - `OfflineForm`: save, restore, clear, sync, submit, metadata
//!   - Autosave scheduler and recovery controller
//!   - `FormRegistry` of open forms
//!
//! # Usage
//!
//! ```rust,no_run
//! use formstash::local_db::LocalDatabase;
//! use formstash::offline::{FormRegistry, FormSnapshot};
//! use formstash::shared::{FormConfig, StoreConfig};
//! use formstash::sync::NetworkMonitor;
//! use std::sync::Arc;
//!
//! # async fn example() -> formstash::shared::FormResult<()> {
//! let store = LocalDatabase::open(&StoreConfig::default()).await?;
//! let registry = FormRegistry::new(Arc::new(store), NetworkMonitor::default());
//!
//! let config = FormConfig::builder("onboarding-individual", "42")
//!     .sync_endpoint("https://deals.example.com/api/forms/sync")
//!     .build()?;
//! let form = registry.open(config, FormSnapshot::default()).await?;
//!
//! if form.check_for_saved_data().await? {
//!     form.restore().await?;
//! }
//! form.set_step(1)?;
//! form.save().await?;
//! form.sync().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! - Stores, reconcilers and forms are `Send + Sync` and shared via `Arc`
//! - Writes to one record key go through a fair per-key lock
//! - Autosave and reconnect handling run as tokio tasks
//!
//! # Error Handling
//!
//! Every fallible operation returns `shared::FormResult<T>`. Storage and
//! network failures are values; nothing in the public surface panics.

/// Shared types and data structures
pub mod shared;

/// Local persistence store
pub mod local_db;

/// Server sync
pub mod sync;

/// Form sessions, autosave, recovery
pub mod offline;

pub use local_db::{FormStore, LocalDatabase, MemoryStore};
pub use offline::{FormRegistry, FormSnapshot, OfflineForm};
pub use shared::{FormConfig, FormError, FormMetadata, FormResult, RecordKey, StoreConfig};
pub use sync::{HttpSyncEndpoint, NetworkMonitor, SyncEndpoint};
