//! Form Persistence Error Types
//!
//! Every public operation in this crate returns `Result<T, FormError>`.
//! Failures are values, never panics, so a form flow can keep going after a
//! storage hiccup or a dropped connection.
//!
//! # Error Categories
//!
//! - `Storage` - local read/write failed (quota, unavailable file, corrupt row)
//! - `Offline` - sync attempted while the reachability observer says offline
//! - `SyncRejected` / `Network` - the remote endpoint refused or was unreachable
//! - `NoRecord` - nothing persisted (an expired record counts as nothing)
//!
//! # Usage
//!
//! ```rust
//! use formstash::shared::error::{FailureReason, FormError};
//!
//! let error = FormError::Offline;
//! assert_eq!(error.reason(), FailureReason::Offline);
//! assert!(error.is_transient());
//! ```
use thiserror::Error;

use crate::shared::config::ConfigError;

/// Errors surfaced by the persistence, sync and recovery layers
#[derive(Debug, Error, Clone)]
pub enum FormError {
    /// Local store read or write failed
    #[error("storage failure: {message}")]
    Storage {
        /// Raw storage error text
        message: String,
    },

    /// Sync attempted while offline; expected, retried on reconnect
    #[error("offline: sync deferred until connectivity returns")]
    Offline,

    /// Remote endpoint answered with a non-success status
    #[error("sync rejected with status {status}: {body}")]
    SyncRejected {
        /// HTTP status code
        status: u16,
        /// Response body, kept for display
        body: String,
    },

    /// Transport failure talking to the endpoint
    #[error("network error: {message}")]
    Network {
        /// Raw transport error text
        message: String,
    },

    /// No sync endpoint configured for this form
    #[error("sync is disabled for this form")]
    SyncDisabled,

    /// Another sync for the same key is still running
    #[error("a sync for this form is already in flight")]
    SyncInFlight,

    /// Nothing persisted for the key (expired records included)
    #[error("no persisted record")]
    NoRecord,

    /// The form session was closed before the operation finished
    #[error("form session closed")]
    SessionClosed,

    /// Recovery action not allowed from the current state
    #[error("cannot {action} while recovery is {state}")]
    InvalidTransition {
        /// Current recovery state name
        state: &'static str,
        /// Requested action name
        action: &'static str,
    },

    /// Payload could not be (de)serialized
    #[error("serialization error: {message}")]
    Serialization {
        /// Human-readable error message
        message: String,
    },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

/// Flat failure reason, the `{ success, failureReason }` shape UIs match on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Storage,
    Offline,
    Rejected,
    Network,
    Disabled,
    InFlight,
    NoRecord,
    Closed,
    Other,
}

impl FormError {
    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Map to the flat failure reason
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::Storage { .. } => FailureReason::Storage,
            Self::Offline => FailureReason::Offline,
            Self::SyncRejected { .. } => FailureReason::Rejected,
            Self::Network { .. } => FailureReason::Network,
            Self::SyncDisabled => FailureReason::Disabled,
            Self::SyncInFlight => FailureReason::InFlight,
            Self::NoRecord => FailureReason::NoRecord,
            Self::SessionClosed => FailureReason::Closed,
            Self::InvalidTransition { .. } | Self::Serialization { .. } | Self::Config(_) => {
                FailureReason::Other
            }
        }
    }

    /// Whether the user can keep filling in the form and retry later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Offline
                | Self::Network { .. }
                | Self::SyncRejected { .. }
                | Self::SyncInFlight
                | Self::Storage { .. }
        )
    }

    /// Whether this failure came from talking to the remote endpoint
    pub fn is_sync_failure(&self) -> bool {
        matches!(self, Self::SyncRejected { .. } | Self::Network { .. })
    }
}

impl From<sqlx::Error> for FormError {
    fn from(err: sqlx::Error) -> Self {
        Self::storage(err.to_string())
    }
}

impl From<serde_json::Error> for FormError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for FormError {
    fn from(err: reqwest::Error) -> Self {
        Self::network(err.to_string())
    }
}

impl From<ConfigError> for FormError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result alias used across the crate
pub type FormResult<T> = Result<T, FormError>;
