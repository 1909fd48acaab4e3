//! Sync error types.

use calsync_providers::ProviderError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that abort a sync or prune run.
///
/// Every variant but [`SyncError::NoLocalEvents`] names the destination.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No local events and no explicit window to derive one from.
    #[error("no local events to synchronize and no window given")]
    NoLocalEvents,

    /// Listing the destination failed; nothing was written.
    #[error("listing events in {destination}: {source}")]
    List {
        destination: String,
        #[source]
        source: ProviderError,
    },

    /// Creating an event failed; earlier writes stay applied.
    #[error("creating {title:?} at {start} in {destination}: {source}")]
    Create {
        destination: String,
        title: String,
        start: DateTime<Utc>,
        #[source]
        source: ProviderError,
    },

    /// Deleting an event failed; earlier writes stay applied.
    #[error("deleting {title:?} ({id}) from {destination}: {source}")]
    Delete {
        destination: String,
        id: String,
        title: String,
        #[source]
        source: ProviderError,
    },

    /// The run was cancelled before it finished.
    #[error("synchronization of {destination} cancelled")]
    Cancelled { destination: String },
}

impl SyncError {
    /// The destination the error concerns, if any.
    pub fn destination(&self) -> Option<&str> {
        match self {
            SyncError::NoLocalEvents => None,
            SyncError::List { destination, .. }
            | SyncError::Create { destination, .. }
            | SyncError::Delete { destination, .. }
            | SyncError::Cancelled { destination } => Some(destination),
        }
    }

    /// The underlying provider error, if any.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            SyncError::List { source, .. }
            | SyncError::Create { source, .. }
            | SyncError::Delete { source, .. } => Some(source),
            SyncError::NoLocalEvents | SyncError::Cancelled { .. } => None,
        }
    }

    /// True if the run stopped because of cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled { .. })
    }
}
