//! Watchdog Error Types

use std::path::PathBuf;

/// Failures of the state store
///
/// The gate never returns these to its callers; it degrades and reports them
/// through [`Outcome`](super::gate::Outcome).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// State file exists but could not be read
    #[error("failed to read state from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// State file is not valid watchdog JSON
    #[error("failed to parse state from {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Containing directory could not be created
    #[error("failed to create state directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// State could not be encoded
    #[error("failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),

    /// State file could not be written or replaced
    #[error("failed to write state to {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Backend refused the operation
    #[error("state store unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures talking to a [`WatchdogService`](super::service::WatchdogService)
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The owning task has stopped
    #[error("watchdog service is closed")]
    Closed,
}
