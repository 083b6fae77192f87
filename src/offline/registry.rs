//! Process-wide table of open forms.
//!
//! Owns what forms share: the store, the reachability signal, one
//! reconciler per sync URL (so duplicate-sync suppression spans every
//! session of a key) and the per-key write locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::local_db::FormStore;
use crate::shared::config::FormConfig;
use crate::shared::error::FormResult;
use crate::shared::record::RecordKey;
use crate::sync::{HttpSyncEndpoint, NetworkMonitor, SyncEndpoint, SyncReconciler};

use super::locks::KeyLocks;
use super::session::FormSnapshot;
use super::{FormParts, OfflineForm};

#[derive(Debug)]
pub struct FormRegistry {
    store: Arc<dyn FormStore>,
    network: NetworkMonitor,
    /// Replaces the HTTP client for every sync-enabled form
    endpoint: Option<Arc<dyn SyncEndpoint>>,
    reconcilers: Mutex<HashMap<String, Arc<SyncReconciler>>>,
    locks: KeyLocks,
    forms: Mutex<HashMap<String, Arc<OfflineForm>>>,
}

impl FormRegistry {
    pub fn new(store: Arc<dyn FormStore>, network: NetworkMonitor) -> Self {
        Self {
            store,
            network,
            endpoint: None,
            reconcilers: Mutex::new(HashMap::new()),
            locks: KeyLocks::new(),
            forms: Mutex::new(HashMap::new()),
        }
    }

    /// Push through `endpoint` instead of HTTP
    pub fn with_endpoint(mut self, endpoint: Arc<dyn SyncEndpoint>) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    pub fn store(&self) -> &Arc<dyn FormStore> {
        &self.store
    }

    /// Open `config.form_id`, or return the session already open for it.
    ///
    /// A session open for the same form under another owner is closed
    /// first.
    pub async fn open(
        &self,
        config: FormConfig,
        defaults: FormSnapshot,
    ) -> FormResult<Arc<OfflineForm>> {
        config.validate()?;

        if let Some(existing) = self.get(&config.form_id) {
            if existing.config().owner_id == config.owner_id {
                return Ok(existing);
            }
            self.close(&config.form_id);
        }

        let reconciler = self.reconciler_for(&config)?;
        let key = RecordKey::new(config.owner_id.clone(), config.form_id.clone());
        let form_id = config.form_id.clone();
        let form = OfflineForm::launch(FormParts {
            config,
            defaults,
            store: self.store.clone(),
            network: self.network.clone(),
            reconciler,
            write_lock: self.locks.lock_for(&key),
        })
        .await;

        // Another open for the same form may have finished first.
        let mut forms = self.forms();
        if let Some(winner) = forms.get(&form_id) {
            if !winner.is_closed() && winner.key() == form.key() {
                form.close();
                return Ok(winner.clone());
            }
        }
        if let Some(replaced) = forms.insert(form_id, form.clone()) {
            replaced.close();
        }
        Ok(form)
    }

    /// The open session for `form_id`
    pub fn get(&self, form_id: &str) -> Option<Arc<OfflineForm>> {
        self.forms()
            .get(form_id)
            .filter(|form| !form.is_closed())
            .cloned()
    }

    /// Close and forget `form_id`; `false` if it was not open
    pub fn close(&self, form_id: &str) -> bool {
        let removed = self.forms().remove(form_id);
        match removed {
            Some(form) => {
                form.close();
                true
            }
            None => false,
        }
    }

    pub fn close_all(&self) {
        let forms: Vec<_> = self.forms().drain().map(|(_, form)| form).collect();
        for form in forms {
            form.close();
        }
    }

    /// Ids of open forms, sorted
    pub fn open_forms(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .forms()
            .iter()
            .filter(|(_, form)| !form.is_closed())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn reconciler_for(&self, config: &FormConfig) -> FormResult<Option<Arc<SyncReconciler>>> {
        let Some(url) = &config.sync_endpoint else {
            return Ok(None);
        };

        let mut reconcilers = self
            .reconcilers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(reconciler) = reconcilers.get(url) {
            return Ok(Some(reconciler.clone()));
        }

        let endpoint: Arc<dyn SyncEndpoint> = match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => Arc::new(HttpSyncEndpoint::new(url.clone())?),
        };
        let reconciler = Arc::new(SyncReconciler::new(
            self.store.clone(),
            endpoint,
            self.network.clone(),
        ));
        reconcilers.insert(url.clone(), reconciler.clone());
        Ok(Some(reconciler))
    }

    fn forms(&self) -> MutexGuard<'_, HashMap<String, Arc<OfflineForm>>> {
        self.forms.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for FormRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}
