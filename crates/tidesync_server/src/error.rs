//! Error types for the reference server.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors returned by the reference server.
///
/// Per-operation verdicts (conflict, rejection) are not errors; they travel
/// in the submission outcome.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServerError {
    /// Malformed request, e.g. an unparseable checkpoint.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The server has no usable authentication setup.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The request carried no valid token.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if the client caused the error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::AuthenticationFailed(_)
                | ServerError::NotAuthorized(_)
        )
    }

    /// Returns true if the server caused the error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Internal(_))
    }
}
