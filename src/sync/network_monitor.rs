//! # Network Monitor
//!
//! Online/offline signal consumed by the sync layer. The platform glue
//! (a connectivity probe, an OS callback, a browser event bridge) calls
//! [`NetworkMonitor::set_status`]; consumers either read the current status
//! or subscribe to offline to online transitions.
//!
//! Backed by a `tokio::sync::watch` channel: subscribers never poll, and a
//! status write that does not change anything wakes nobody. Flapping faster
//! than a subscriber runs can coalesce into a single observed transition.

use std::sync::Arc;

use tokio::sync::watch;

/// Network connectivity status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Online,
    Offline,
}

/// Shared reachability signal; clones observe the same status
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    status: Arc<watch::Sender<NetworkStatus>>,
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(NetworkStatus::Online)
    }
}

impl NetworkMonitor {
    pub fn new(initial: NetworkStatus) -> Self {
        let (status, _) = watch::channel(initial);
        Self {
            status: Arc::new(status),
        }
    }

    pub fn get_status(&self) -> NetworkStatus {
        *self.status.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.get_status() == NetworkStatus::Online
    }

    /// Update the status; returns `true` if it changed
    pub fn set_status(&self, status: NetworkStatus) -> bool {
        let changed = self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            tracing::info!(?status, "network status changed");
        }
        changed
    }

    pub fn set_online(&self, online: bool) -> bool {
        self.set_status(if online {
            NetworkStatus::Online
        } else {
            NetworkStatus::Offline
        })
    }

    /// Subscribe to status transitions
    pub fn subscribe(&self) -> ReachabilityEvents {
        let rx = self.status.subscribe();
        let last = *rx.borrow();
        ReachabilityEvents { rx, last }
    }
}

/// Transition stream for one subscriber
#[derive(Debug)]
pub struct ReachabilityEvents {
    rx: watch::Receiver<NetworkStatus>,
    last: NetworkStatus,
}

impl ReachabilityEvents {
    /// Wait for the next status change; `None` once the monitor is gone
    pub async fn next_change(&mut self) -> Option<(NetworkStatus, NetworkStatus)> {
        loop {
            self.rx.changed().await.ok()?;
            let current = *self.rx.borrow_and_update();
            let previous = std::mem::replace(&mut self.last, current);
            if previous != current {
                return Some((previous, current));
            }
        }
    }

    /// Wait for the next offline to online transition
    pub async fn reconnected(&mut self) -> Option<()> {
        loop {
            if let (NetworkStatus::Offline, NetworkStatus::Online) = self.next_change().await? {
                return Some(());
            }
        }
    }
}
