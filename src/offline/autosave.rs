//! # Autosave Scheduler
//!
//! A cancellable repeating task. Every `interval` it asks its target to run
//! one autosave tick (dirty check, then write if needed). A manual save
//! calls [`AutosaveHandle::reset`] so the next tick is a full interval away.
//!
//! The task holds only a `Weak` reference to its target and stops on its
//! own once the target is dropped or reports itself closed. Dropping or
//! cancelling the handle aborts the task; a tick already running is allowed
//! to finish, and the target is responsible for ignoring its result.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing changed since the last save; no write issued
    Clean,
    /// Snapshot written
    Saved,
    /// Write failed; the form keeps working
    Failed,
    /// Autosave suspended after repeated failures
    Suspended,
    /// A saved draft is still waiting for resume/discard
    Deferred,
}

/// Something the scheduler can autosave
#[async_trait]
pub trait AutosaveTarget: Send + Sync + 'static {
    async fn autosave_tick(&self) -> TickOutcome;

    /// Once `true`, the scheduler exits
    fn is_closed(&self) -> bool;
}

/// Handle to a running autosave task
#[derive(Debug)]
pub struct AutosaveHandle {
    task: JoinHandle<()>,
    reset: Arc<Notify>,
    interval: Duration,
}

impl AutosaveHandle {
    /// Start ticking every `interval`
    pub fn spawn<T: AutosaveTarget>(target: Weak<T>, interval: Duration) -> Self {
        let reset = Arc::new(Notify::new());
        let task = tokio::spawn(run(target, interval, reset.clone()));
        Self {
            task,
            reset,
            interval,
        }
    }

    /// Restart the interval from now
    pub fn reset(&self) {
        self.reset.notify_one();
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the timer
    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for AutosaveHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run<T: AutosaveTarget>(target: Weak<T>, interval: Duration, reset: Arc<Notify>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = reset.notified() => continue,
        }

        let Some(target) = target.upgrade() else {
            break;
        };
        if target.is_closed() {
            break;
        }
        match target.autosave_tick().await {
            TickOutcome::Clean => tracing::trace!("autosave tick: clean"),
            outcome => tracing::debug!(?outcome, "autosave tick"),
        }
    }
    tracing::debug!("autosave scheduler stopped");
}
