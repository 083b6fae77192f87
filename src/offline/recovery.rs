//! # Recovery Controller
//!
//! Runs once per session, on mount, and decides whether a previously saved
//! draft is offered back to the user.
//!
//! ```text
//! Unchecked -> Checking -> NoRecord
//!                       -> RecordFound -> Restored
//!                                      -> Discarded
//! ```
//!
//! `RecordFound` never touches the live form. Only an explicit `restore`
//! or `discard` moves it on. A failed restore (bad payload, callback
//! error, storage error) leaves the controller in `RecordFound` so the
//! user can pick again.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::local_db::FormStore;
use crate::shared::error::{FormError, FormResult};
use crate::shared::record::RecordKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    Unchecked,
    Checking,
    NoRecord,
    RecordFound {
        saved_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
    Restored,
    Discarded,
}

impl RecoveryState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unchecked => "unchecked",
            Self::Checking => "checking",
            Self::NoRecord => "no_record",
            Self::RecordFound { .. } => "record_found",
            Self::Restored => "restored",
            Self::Discarded => "discarded",
        }
    }

    /// A decision is waiting on the user
    pub fn is_pending_decision(&self) -> bool {
        matches!(self, Self::RecordFound { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::NoRecord | Self::Restored | Self::Discarded)
    }
}

#[derive(Debug)]
pub struct RecoveryController {
    store: Arc<dyn FormStore>,
    key: RecordKey,
    state: Mutex<RecoveryState>,
}

impl RecoveryController {
    pub fn new(store: Arc<dyn FormStore>, key: RecordKey) -> Self {
        Self {
            store,
            key,
            state: Mutex::new(RecoveryState::Unchecked),
        }
    }

    pub fn state(&self) -> RecoveryState {
        *self.lock()
    }

    /// Look for a live record. Only valid from `Unchecked`; a storage
    /// failure puts the controller back there.
    pub async fn check(&self) -> FormResult<RecoveryState> {
        self.transition("check", |s| matches!(s, RecoveryState::Unchecked), RecoveryState::Checking)?;

        let next = match self.store.record(&self.key).await {
            Ok(Some(record)) => RecoveryState::RecordFound {
                saved_at: record.saved_at,
                expires_at: record.expires_at,
            },
            Ok(None) => RecoveryState::NoRecord,
            Err(e) => {
                self.set(RecoveryState::Unchecked);
                return Err(e);
            }
        };

        self.set(next);
        tracing::debug!(key = %self.key, state = next.name(), "recovery check finished");
        Ok(next)
    }

    /// Load the found record and hand it to `apply`.
    ///
    /// Returns `Ok(None)` when the record expired or was removed after the
    /// check; the controller then settles in `NoRecord`.
    pub async fn restore<F>(&self, apply: F) -> FormResult<Option<Value>>
    where
        F: FnOnce(&Value) -> FormResult<()>,
    {
        let found = self.state();
        if !found.is_pending_decision() {
            return Err(FormError::InvalidTransition {
                state: found.name(),
                action: "restore",
            });
        }

        let payload = match self.store.load(&self.key).await? {
            Some(payload) => payload,
            None => {
                self.set(RecoveryState::NoRecord);
                tracing::info!(key = %self.key, "saved draft expired before restore");
                return Ok(None);
            }
        };

        apply(&payload)?;
        self.set(RecoveryState::Restored);
        tracing::info!(key = %self.key, "saved draft restored");
        Ok(Some(payload))
    }

    /// Delete the found record
    pub async fn discard(&self) -> FormResult<()> {
        let found = self.state();
        if !found.is_pending_decision() {
            return Err(FormError::InvalidTransition {
                state: found.name(),
                action: "discard",
            });
        }

        self.store.remove(&self.key).await?;
        self.set(RecoveryState::Discarded);
        tracing::info!(key = %self.key, "saved draft discarded");
        Ok(())
    }

    /// The record was removed by other means (clear, submit). A pending
    /// offer is withdrawn.
    pub fn withdraw(&self) {
        let mut state = self.lock();
        if state.is_pending_decision() {
            *state = RecoveryState::Discarded;
        }
    }

    fn transition(
        &self,
        action: &'static str,
        allowed: impl Fn(&RecoveryState) -> bool,
        next: RecoveryState,
    ) -> FormResult<()> {
        let mut state = self.lock();
        if !allowed(&state) {
            return Err(FormError::InvalidTransition {
                state: state.name(),
                action,
            });
        }
        *state = next;
        Ok(())
    }

    fn set(&self, next: RecoveryState) {
        *self.lock() = next;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RecoveryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
