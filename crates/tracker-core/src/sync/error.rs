//! Sync and remote error types

use thiserror::Error;

use crate::models::ConfidenceMap;
use crate::storage::StorageError;

/// Failure of a single remote call
///
/// Every remote operation fails closed with one of these; a failed
/// push never means a partially applied one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Session missing, expired or rejected (also bad credentials on login)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Transport failure, connection refused or timeout
    #[error("Network error: {0}")]
    Network(String),

    /// 5xx or an unexpected response from the server
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Malformed request (missing credentials, bad map, duplicate username)
    #[error("Invalid request: {0}")]
    Validation(String),
}

impl RemoteError {
    /// Whether a blind retry can succeed
    ///
    /// All remote calls are idempotent, so transport and server faults are
    /// safe to retry. An unauthorized call needs a new login first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Network(_) | RemoteError::Server { .. })
    }
}

/// Step of a sync that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    Fetch,
    LocalWrite,
    Push,
}

/// Failure of [`SyncEngine::sync`](super::SyncEngine::sync)
#[derive(Error, Debug)]
pub enum SyncError {
    /// No authenticated session; nothing was read or written
    #[error("Not authenticated. Log in to sync with the server.")]
    NotAuthenticated,

    /// Another sync is still running
    #[error("A sync is already in progress")]
    InProgress,

    /// Fetching the remote map failed; nothing was written
    #[error("Failed to fetch remote data: {0}")]
    Fetch(#[source] RemoteError),

    /// Writing the merged map locally failed; nothing was pushed
    #[error("Failed to save merged data locally: {0}")]
    LocalWrite(#[source] StorageError),

    /// The merged map is saved locally but the server did not take it
    #[error("Local data saved, but pushing to the server failed: {source}")]
    PartialSync {
        merged: ConfidenceMap,
        #[source]
        source: RemoteError,
    },
}

impl SyncError {
    /// The step that failed, if any step ran
    pub fn step(&self) -> Option<SyncStep> {
        match self {
            SyncError::NotAuthenticated | SyncError::InProgress => None,
            SyncError::Fetch(_) => Some(SyncStep::Fetch),
            SyncError::LocalWrite(_) => Some(SyncStep::LocalWrite),
            SyncError::PartialSync { .. } => Some(SyncStep::Push),
        }
    }

    /// The remote error behind this failure, if any
    pub fn remote_error(&self) -> Option<&RemoteError> {
        match self {
            SyncError::Fetch(e) | SyncError::PartialSync { source: e, .. } => Some(e),
            _ => None,
        }
    }

    /// Whether only the push half needs retrying
    pub fn needs_push_retry(&self) -> bool {
        matches!(self, SyncError::PartialSync { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(RemoteError::Network("timeout".into()).is_retryable());
        assert!(RemoteError::Server {
            status: 503,
            message: "down".into()
        }
        .is_retryable());
        assert!(!RemoteError::Unauthorized("expired".into()).is_retryable());
        assert!(!RemoteError::Validation("bad".into()).is_retryable());
    }

    #[test]
    fn test_sync_error_steps() {
        assert_eq!(SyncError::NotAuthenticated.step(), None);
        assert_eq!(
            SyncError::Fetch(RemoteError::Network("x".into())).step(),
            Some(SyncStep::Fetch)
        );

        let partial = SyncError::PartialSync {
            merged: ConfidenceMap::new(),
            source: RemoteError::Server {
                status: 500,
                message: "boom".into(),
            },
        };
        assert_eq!(partial.step(), Some(SyncStep::Push));
        assert!(partial.needs_push_retry());
        assert!(partial.to_string().contains("Local data saved"));
        assert!(matches!(
            partial.remote_error(),
            Some(RemoteError::Server { status: 500, .. })
        ));
    }
}
