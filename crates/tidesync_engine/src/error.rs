//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A gateway call exceeded the request timeout.
    #[error("operation timed out")]
    Timeout,

    /// The remote store is not reachable.
    #[error("not connected to server")]
    NotConnected,

    /// No valid credentials could be obtained or the server refused them.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The remote store sent something the engine cannot interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The local store failed.
    #[error("local store error: {0}")]
    Store(String),

    /// A local write referred to an entity that does not exist.
    #[error("entity {0} not found")]
    NotFound(String),

    /// A local insert reused an existing identity.
    #[error("entity {0} already exists")]
    AlreadyExists(String),

    /// A non-forced purge matched rows with unsynced local operations.
    #[error("purge refused: {count} pending operation(s) match the query")]
    PendingOperations {
        /// Number of matching pending operations.
        count: usize,
    },

    /// The caller cancelled the operation.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried on a later cycle.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout | SyncError::NotConnected => true,
            _ => false,
        }
    }

    /// Returns true if the error came from talking to the remote store.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            SyncError::Transport { .. }
                | SyncError::Timeout
                | SyncError::NotConnected
                | SyncError::AuthenticationFailed(_)
                | SyncError::Protocol(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("invalid certificate").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::NotConnected.is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
        assert!(!SyncError::Store("disk full".into()).is_retryable());
    }

    #[test]
    fn remote_classification() {
        assert!(SyncError::AuthenticationFailed("expired".into()).is_remote());
        assert!(SyncError::Timeout.is_remote());
        assert!(!SyncError::Store("io".into()).is_remote());
        assert!(!SyncError::PendingOperations { count: 2 }.is_remote());
    }

    #[test]
    fn error_display() {
        let err = SyncError::PendingOperations { count: 3 };
        assert_eq!(
            err.to_string(),
            "purge refused: 3 pending operation(s) match the query"
        );
        assert_eq!(SyncError::NotConnected.to_string(), "not connected to server");
    }
}
