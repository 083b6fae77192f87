//! # Offline Form
//!
//! The surface an application talks to for one open form: local saves,
//! autosave, recovery of a previous draft, sync and terminal submission,
//! plus the [`FormMetadata`] the UI renders save/sync indicators from.
//!
//! ## Architecture
//!
//! - `session.rs`: the in-memory form state and its dirty baseline
//! - `autosave.rs`: the cancellable interval task
//! - `recovery.rs`: the resume/discard state machine
//! - `locks.rs`: one in-flight write per record key
//! - `registry.rs`: process-wide `form_id -> OfflineForm` table
//!
//! ## Lifecycle
//!
//! Opening a form checks for a saved draft and starts the autosave and
//! reconnect tasks. [`OfflineForm::close`] stops both. Operations already
//! running when the form closes still finish and return to their caller,
//! but they no longer touch the session or its metadata; later calls fail
//! with [`FormError::SessionClosed`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use formstash::local_db::MemoryStore;
//! use formstash::offline::{FormSnapshot, OfflineForm};
//! use formstash::shared::FormConfig;
//! use formstash::sync::NetworkMonitor;
//! use std::sync::Arc;
//!
//! # async fn example() -> formstash::shared::FormResult<()> {
//! let config = FormConfig::builder("onboarding-individual", "42").build()?;
//! let form = OfflineForm::open(
//!     config,
//!     FormSnapshot::default(),
//!     Arc::new(MemoryStore::new()),
//!     NetworkMonitor::default(),
//! )
//! .await?;
//!
//! form.set_field("name", serde_json::json!("Ada"))?;
//! form.save().await?;
//! # Ok(())
//! # }
//! ```

pub mod autosave;
pub mod locks;
pub mod recovery;
pub mod registry;
pub mod session;

pub use autosave::{AutosaveHandle, AutosaveTarget, TickOutcome};
pub use locks::{KeyLocks, WriteLock};
pub use recovery::{RecoveryController, RecoveryState};
pub use registry::FormRegistry;
pub use session::{FormSession, FormSnapshot};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::local_db::FormStore;
use crate::shared::config::FormConfig;
use crate::shared::error::{FormError, FormResult};
use crate::shared::record::{FormMetadata, RecordKey, SaveOutcome, SyncState};
use crate::sync::{
    HttpSyncEndpoint, NetworkMonitor, ReachabilityEvents, SyncEndpoint, SyncReceipt,
    SyncReconciler,
};

/// Save bookkeeping that is not stored with the record
#[derive(Debug, Default)]
struct SaveHealth {
    consecutive_failures: u32,
    suspended: bool,
}

#[derive(Debug, Default)]
struct BackgroundTasks {
    autosave: Option<AutosaveHandle>,
    reconnect: Option<JoinHandle<()>>,
}

/// Everything a form needs that may be shared with other forms
pub(crate) struct FormParts {
    pub config: FormConfig,
    pub defaults: FormSnapshot,
    pub store: Arc<dyn FormStore>,
    pub network: NetworkMonitor,
    pub reconciler: Option<Arc<SyncReconciler>>,
    pub write_lock: WriteLock,
}

/// One open form session
#[derive(Debug)]
pub struct OfflineForm {
    key: RecordKey,
    config: FormConfig,
    session_id: Uuid,
    store: Arc<dyn FormStore>,
    network: NetworkMonitor,
    reconciler: Option<Arc<SyncReconciler>>,
    write_lock: WriteLock,
    session: Mutex<FormSession>,
    recovery: RecoveryController,
    persisted: Mutex<FormMetadata>,
    health: Mutex<SaveHealth>,
    closed: AtomicBool,
    tasks: Mutex<BackgroundTasks>,
    span: tracing::Span,
}

impl OfflineForm {
    /// Open a form with its own write lock. Sync goes over HTTP when the
    /// config names an endpoint.
    pub async fn open(
        config: FormConfig,
        defaults: FormSnapshot,
        store: Arc<dyn FormStore>,
        network: NetworkMonitor,
    ) -> FormResult<Arc<Self>> {
        let endpoint: Option<Arc<dyn SyncEndpoint>> = match &config.sync_endpoint {
            Some(url) => Some(Arc::new(HttpSyncEndpoint::new(url.clone())?)),
            None => None,
        };
        Self::open_inner(config, defaults, store, network, endpoint).await
    }

    /// Like [`OfflineForm::open`], pushing through `endpoint` instead of
    /// HTTP. Sync stays disabled unless the config names an endpoint.
    pub async fn open_with_endpoint(
        config: FormConfig,
        defaults: FormSnapshot,
        store: Arc<dyn FormStore>,
        network: NetworkMonitor,
        endpoint: Arc<dyn SyncEndpoint>,
    ) -> FormResult<Arc<Self>> {
        let endpoint = config.sync_enabled().then_some(endpoint);
        Self::open_inner(config, defaults, store, network, endpoint).await
    }

    async fn open_inner(
        config: FormConfig,
        defaults: FormSnapshot,
        store: Arc<dyn FormStore>,
        network: NetworkMonitor,
        endpoint: Option<Arc<dyn SyncEndpoint>>,
    ) -> FormResult<Arc<Self>> {
        config.validate()?;
        let reconciler = endpoint.map(|endpoint| {
            Arc::new(SyncReconciler::new(store.clone(), endpoint, network.clone()))
        });
        let form = Self::launch(FormParts {
            config,
            defaults,
            store,
            network,
            reconciler,
            write_lock: WriteLock::default(),
        })
        .await;
        Ok(form)
    }

    /// Build, check for a saved draft, start background tasks
    pub(crate) async fn launch(parts: FormParts) -> Arc<Self> {
        let form = Arc::new(Self::assemble(parts));
        form.mount().await;
        form.start();
        form
    }

    fn assemble(parts: FormParts) -> Self {
        let FormParts {
            config,
            defaults,
            store,
            network,
            reconciler,
            write_lock,
        } = parts;
        let key = RecordKey::new(config.owner_id.clone(), config.form_id.clone());
        let session_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "form",
            form_id = %config.form_id,
            owner_id = %config.owner_id,
            session_id = %session_id,
        );

        Self {
            recovery: RecoveryController::new(store.clone(), key.clone()),
            session: Mutex::new(FormSession::new(defaults)),
            persisted: Mutex::new(FormMetadata::default()),
            health: Mutex::new(SaveHealth::default()),
            closed: AtomicBool::new(false),
            tasks: Mutex::new(BackgroundTasks::default()),
            key,
            config,
            session_id,
            store,
            network,
            reconciler,
            write_lock,
            span,
        }
    }

    /// Initial recovery check. A storage failure here leaves recovery
    /// unchecked; `restore` will retry it.
    async fn mount(&self) {
        match self.recovery.check().await {
            Ok(RecoveryState::RecordFound { saved_at, .. }) => {
                tracing::info!(parent: &self.span, %saved_at, "saved draft found");
                if let Err(e) = self.refresh_metadata().await {
                    tracing::warn!(parent: &self.span, error = %e, "could not read draft metadata");
                }
            }
            Ok(_) => tracing::debug!(parent: &self.span, "no saved draft"),
            Err(e) => {
                tracing::warn!(parent: &self.span, error = %e, "recovery check failed");
                self.persisted().last_error = Some(e.to_string());
            }
        }
    }

    fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks();

        if self.config.auto_save {
            tasks.autosave = Some(AutosaveHandle::spawn(
                Arc::downgrade(self),
                self.config.auto_save_interval,
            ));
        }

        if self.reconciler.is_some() && self.config.auto_sync_on_reconnect {
            let events = self.network.subscribe();
            let listener = reconnect_listener(Arc::downgrade(self), events);
            tasks.reconnect = Some(tokio::spawn(listener.instrument(self.span.clone())));
        }

        tracing::info!(
            parent: &self.span,
            auto_save = self.config.auto_save,
            sync = self.reconciler.is_some(),
            "form opened"
        );
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    pub fn form_id(&self) -> &str {
        &self.key.form_id
    }

    pub fn config(&self) -> &FormConfig {
        &self.config
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn recovery_state(&self) -> RecoveryState {
        self.recovery.state()
    }

    // ---- form state ----

    pub fn set_field(&self, name: impl Into<String>, value: Value) -> FormResult<()> {
        self.ensure_open()?;
        self.session().set_field(name, value)
    }

    pub fn remove_field(&self, name: &str) -> FormResult<Option<Value>> {
        self.ensure_open()?;
        Ok(self.session().remove_field(name))
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.session().field(name).cloned()
    }

    pub fn set_step(&self, step: usize) -> FormResult<()> {
        self.ensure_open()?;
        self.session().set_step(step);
        Ok(())
    }

    pub fn step(&self) -> usize {
        self.session().step()
    }

    /// Edit the session in place
    pub fn update<R>(&self, edit: impl FnOnce(&mut FormSession) -> R) -> FormResult<R> {
        self.ensure_open()?;
        Ok(edit(&mut self.session()))
    }

    /// Current form state as JSON
    pub fn snapshot(&self) -> Value {
        self.session().snapshot()
    }

    pub fn is_dirty(&self) -> bool {
        self.session().is_dirty()
    }

    // ---- persistence ----

    /// Save now if dirty. Restarts the autosave interval and re-arms a
    /// suspended autosave. Returns `None` when there was nothing to write.
    pub async fn save(&self) -> FormResult<Option<SaveOutcome>> {
        self.ensure_open()?;
        if let Some(autosave) = &self.tasks().autosave {
            autosave.reset();
        }

        let result = self.persist().await;
        if result.is_ok() && !self.is_closed() {
            let mut health = self.health();
            if health.suspended {
                tracing::info!(parent: &self.span, "autosave re-armed by manual save");
            }
            health.suspended = false;
        }
        result
    }

    /// Dirty check then write, under the key's write lock
    async fn persist(&self) -> FormResult<Option<SaveOutcome>> {
        let _write = self.write_lock.lock().await;
        self.ensure_open()?;

        let snapshot = {
            let session = self.session();
            if !session.is_dirty() {
                return Ok(None);
            }
            session.snapshot()
        };

        match self.store.save(&self.key, &snapshot, self.config.ttl).await {
            Ok(outcome) => {
                if !self.is_closed() {
                    self.session().mark_saved(snapshot);
                    self.note_saved(&outcome);
                }
                tracing::debug!(parent: &self.span, changed = outcome.changed, "form saved");
                Ok(Some(outcome))
            }
            Err(e) => {
                if !self.is_closed() {
                    self.note_save_failure(&e);
                }
                Err(e)
            }
        }
    }

    fn note_saved(&self, outcome: &SaveOutcome) {
        {
            let mut persisted = self.persisted();
            persisted.has_persisted_data = true;
            persisted.last_saved = Some(outcome.saved_at);
            persisted.expires_at = Some(outcome.expires_at);
            persisted.sync_pending = outcome.sync_pending;
            persisted.sync_state = Some(outcome.sync_state);
            persisted.last_error = outcome.last_sync_error.clone();
        }
        self.health().consecutive_failures = 0;
    }

    fn note_save_failure(&self, error: &FormError) {
        tracing::warn!(parent: &self.span, error = %error, "form save failed");
        self.persisted().last_error = Some(error.to_string());

        let mut health = self.health();
        health.consecutive_failures += 1;
        if !health.suspended && health.consecutive_failures >= self.config.max_consecutive_save_failures {
            health.suspended = true;
            tracing::warn!(
                parent: &self.span,
                failures = health.consecutive_failures,
                "autosave suspended after repeated storage failures"
            );
        }
    }

    /// Whether a live draft is stored, without loading it
    pub async fn check_for_saved_data(&self) -> FormResult<bool> {
        self.ensure_open()?;
        let exists = self.store.exists(&self.key).await?;
        if !exists && !self.is_closed() {
            *self.persisted() = FormMetadata::default();
        }
        Ok(exists)
    }

    /// Resume the saved draft. `None` when there is none.
    ///
    /// Returns the stored payload whenever [`OfflineForm::check_for_saved_data`]
    /// would return `true`, including drafts saved after the recovery offer
    /// was settled.
    pub async fn restore(&self) -> FormResult<Option<Value>> {
        self.restore_with(|_| Ok(())).await
    }

    /// Resume the saved draft, handing the payload to `apply` first. If
    /// `apply` fails nothing changes and the draft can still be restored.
    pub async fn restore_with<F>(&self, apply: F) -> FormResult<Option<Value>>
    where
        F: FnOnce(&Value) -> FormResult<()> + Send,
    {
        self.ensure_open()?;
        let _write = self.write_lock.lock().await;

        if self.recovery.state() == RecoveryState::Unchecked {
            self.recovery.check().await?;
        }

        let restored = if self.recovery.state().is_terminal() {
            // Offer already settled: whatever is stored now is the draft.
            match self.store.load(&self.key).await? {
                Some(payload) => {
                    self.apply_restored(&payload, apply)?;
                    Some(payload)
                }
                None => None,
            }
        } else {
            self.recovery
                .restore(|payload| self.apply_restored(payload, apply))
                .await?
        };

        if restored.is_some() {
            self.refresh_metadata().await?;
        } else {
            *self.persisted() = FormMetadata::default();
        }
        Ok(restored)
    }

    fn apply_restored<F>(&self, payload: &Value, apply: F) -> FormResult<()>
    where
        F: FnOnce(&Value) -> FormResult<()>,
    {
        FormSnapshot::from_value(payload)?;
        apply(payload)?;
        if self.is_closed() {
            return Err(FormError::SessionClosed);
        }
        self.session().restore(payload)
    }

    /// Drop the saved draft offered by recovery; the form returns to its
    /// defaults.
    pub async fn discard(&self) -> FormResult<()> {
        self.ensure_open()?;
        let _write = self.write_lock.lock().await;
        self.recovery.discard().await?;
        self.reset_local();
        Ok(())
    }

    /// Delete whatever is stored for this form and reset it to defaults
    pub async fn clear(&self) -> FormResult<()> {
        self.ensure_open()?;
        let _write = self.write_lock.lock().await;
        self.store.remove(&self.key).await?;
        self.recovery.withdraw();
        self.reset_local();
        tracing::info!(parent: &self.span, "form cleared");
        Ok(())
    }

    fn reset_local(&self) {
        if self.is_closed() {
            return;
        }
        self.session().reset();
        *self.persisted() = FormMetadata::default();
        *self.health() = SaveHealth::default();
    }

    // ---- sync ----

    /// Push the saved draft to the endpoint. Unsaved edits are not included;
    /// call [`OfflineForm::save`] first.
    pub async fn sync(&self) -> FormResult<SyncReceipt> {
        self.ensure_open()?;
        let reconciler = self.reconciler.as_ref().ok_or(FormError::SyncDisabled)?;
        let result = reconciler.sync_to_server(&self.key).await;
        self.note_sync(&result);
        result
    }

    /// Terminal submission: save pending edits, push, then drop the local
    /// draft. Any failure leaves the draft in place for a retry.
    pub async fn submit(&self) -> FormResult<SyncReceipt> {
        self.ensure_open()?;
        let reconciler = self.reconciler.as_ref().ok_or(FormError::SyncDisabled)?;
        if !self.network.is_online() {
            return Err(FormError::Offline);
        }

        self.persist().await?;
        let _write = self.write_lock.lock().await;
        let result = reconciler.submit(&self.key).await;

        match &result {
            Ok(_) if !self.is_closed() => {
                self.recovery.withdraw();
                *self.persisted() = FormMetadata::default();
                tracing::info!(parent: &self.span, "form submitted");
            }
            Ok(_) => {}
            Err(_) => self.note_sync(&result),
        }
        result
    }

    async fn sync_on_reconnect(&self) {
        let Some(reconciler) = &self.reconciler else {
            return;
        };
        let result = reconciler.sync_if_pending(&self.key).await;
        match &result {
            Ok(Some(receipt)) => self.note_sync(&Ok(receipt.clone())),
            Ok(None) => tracing::debug!(parent: &self.span, "nothing pending on reconnect"),
            Err(e) => self.note_sync(&Err(e.clone())),
        }
    }

    fn note_sync(&self, result: &FormResult<SyncReceipt>) {
        if self.is_closed() {
            return;
        }
        let mut persisted = self.persisted();
        match result {
            Ok(receipt) => {
                persisted.last_synced_at = Some(receipt.synced_at);
                persisted.sync_pending = receipt.still_pending;
                persisted.sync_state = Some(if receipt.still_pending {
                    SyncState::Pending
                } else {
                    SyncState::Synced
                });
                persisted.last_error = None;
            }
            Err(FormError::Offline) => {
                tracing::debug!(parent: &self.span, "offline, will sync later");
            }
            Err(FormError::SyncInFlight) => {}
            Err(FormError::NoRecord) => *persisted = FormMetadata::default(),
            Err(e) => {
                if e.is_sync_failure() {
                    persisted.sync_state = Some(SyncState::Failed);
                }
                persisted.last_error = Some(e.to_string());
            }
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.reconciler
            .as_ref()
            .is_some_and(|r| r.is_syncing(&self.key))
    }

    // ---- metadata ----

    /// What the UI shows. Reads cached state; no I/O.
    pub fn metadata(&self) -> FormMetadata {
        let mut metadata = self.persisted().clone();
        metadata.is_dirty = self.is_dirty();
        metadata.autosave_suspended = self.health().suspended;
        metadata
    }

    /// Re-read the stored record into the metadata cache
    pub async fn refresh_metadata(&self) -> FormResult<FormMetadata> {
        let record = self.store.record(&self.key).await?;
        if !self.is_closed() {
            let mut persisted = self.persisted();
            let last_error = persisted.last_error.take();
            *persisted = match &record {
                Some(record) => FormMetadata::from_record(record),
                None => FormMetadata::default(),
            };
            if persisted.last_error.is_none() {
                persisted.last_error = last_error;
            }
        }
        Ok(self.metadata())
    }

    // ---- teardown ----

    /// Stop autosave and the reconnect listener. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut tasks = self.tasks();
        if let Some(autosave) = tasks.autosave.take() {
            autosave.cancel();
        }
        if let Some(reconnect) = tasks.reconnect.take() {
            reconnect.abort();
        }
        tracing::info!(parent: &self.span, "form closed");
    }

    fn ensure_open(&self) -> FormResult<()> {
        if self.is_closed() {
            Err(FormError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn session(&self) -> MutexGuard<'_, FormSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persisted(&self) -> MutexGuard<'_, FormMetadata> {
        self.persisted.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn health(&self) -> MutexGuard<'_, SaveHealth> {
        self.health.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tasks(&self) -> MutexGuard<'_, BackgroundTasks> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for OfflineForm {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(reconnect) = tasks.reconnect.take() {
            reconnect.abort();
        }
    }
}

#[async_trait]
impl AutosaveTarget for OfflineForm {
    async fn autosave_tick(&self) -> TickOutcome {
        if self.health().suspended {
            return TickOutcome::Suspended;
        }
        if self.recovery.state().is_pending_decision() {
            return TickOutcome::Deferred;
        }
        if !self.is_dirty() {
            return TickOutcome::Clean;
        }

        match self.persist().await {
            Ok(Some(_)) => TickOutcome::Saved,
            Ok(None) => TickOutcome::Clean,
            Err(_) if self.health().suspended => TickOutcome::Suspended,
            Err(_) => TickOutcome::Failed,
        }
    }

    fn is_closed(&self) -> bool {
        OfflineForm::is_closed(self)
    }
}

/// One `sync_if_pending` per offline to online transition
async fn reconnect_listener(form: Weak<OfflineForm>, mut events: ReachabilityEvents) {
    while events.reconnected().await.is_some() {
        let Some(form) = form.upgrade() else {
            break;
        };
        if form.is_closed() {
            break;
        }
        tracing::info!("back online, syncing pending draft");
        form.sync_on_reconnect().await;
    }
}
