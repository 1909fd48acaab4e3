//! Client error types.

use calsync_engine::SyncError;
use calsync_providers::ProviderError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// No calendar of the given kind is enabled.
    #[error("no enabled {kind} calendars found")]
    NoEnabled { kind: &'static str },

    /// `--delete-dst` named a calendar that is not configured or not enabled.
    #[error("calendar {name:?} not found or not enabled")]
    UnknownCalendar { name: String },

    /// Fetching events from a source calendar failed.
    #[error("getting events from source calendar {name}: {source}")]
    Source {
        name: String,
        #[source]
        source: ProviderError,
    },

    /// Synchronizing or pruning a destination failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Provider error.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The run was interrupted or hit its deadline.
    #[error("run cancelled")]
    Cancelled,
}

impl ClientError {
    /// True when the failure came from a provider error that a later run
    /// may not hit again (network, rate limit, server side).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Source { source, .. } | Self::Provider(source) => source.is_retryable(),
            Self::Sync(e) => e.provider_error().is_some_and(ProviderError::is_retryable),
            _ => false,
        }
    }
}
