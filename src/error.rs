//! Error types for the Ratewarden service.

use thiserror::Error;

use crate::store::StoreError;

/// Main error type for Ratewarden operations.
#[derive(Error, Debug)]
pub enum WardenError {
    /// Rejected before any store call (empty identity, zero limit, bad window)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The counter store could not be reached or did not answer in time
    #[error("Counter store unavailable during {operation} for identity '{identity}': {reason}")]
    BackendUnavailable {
        operation: &'static str,
        identity: String,
        reason: String,
    },

    /// The atomic decision script itself failed
    #[error("Decision script failed for identity '{identity}': {reason}")]
    ScriptExecution { identity: String, reason: String },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WardenError {
    /// Attach operation and identity context to a store failure.
    pub fn from_store(err: StoreError, operation: &'static str, identity: &str) -> Self {
        match err {
            StoreError::Unavailable(reason) => WardenError::BackendUnavailable {
                operation,
                identity: identity.to_string(),
                reason,
            },
            StoreError::Script(reason) => WardenError::ScriptExecution {
                identity: identity.to_string(),
                reason,
            },
        }
    }

    /// Whether the failure came from the counter store rather than the caller.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            WardenError::BackendUnavailable { .. } | WardenError::ScriptExecution { .. }
        )
    }
}

impl From<config::ConfigError> for WardenError {
    fn from(err: config::ConfigError) -> Self {
        WardenError::Config(err.to_string())
    }
}

/// Result type alias for Ratewarden operations.
pub type Result<T> = std::result::Result<T, WardenError>;
