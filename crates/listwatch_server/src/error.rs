//! Error types for the resource server.

use listwatch_protocol::{ResourceKey, ResourceVersion};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the resource server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// The API refused the call.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// A stream was aborted with an application-level error.
    #[error("stream fault: {0}")]
    Fault(String),

    /// The requested watch version is no longer in the change log.
    #[error("resource version {requested} is too old, oldest available is {oldest}")]
    VersionTooOld {
        /// Version the client asked for.
        requested: ResourceVersion,
        /// Oldest version a watch can start from.
        oldest: ResourceVersion,
    },

    /// Invalid request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No resource with this key.
    #[error("resource not found: {0}")]
    NotFound(ResourceKey),

    /// A resource with this key already exists.
    #[error("resource already exists: {0}")]
    AlreadyExists(ResourceKey),

    /// The watcher fell behind the change broadcast.
    #[error("watch lagged, {0} changes dropped")]
    WatchLagged(u64),
}

impl ServerError {
    /// Returns true if the caller sent something invalid.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::VersionTooOld { .. }
                | ServerError::InvalidRequest(_)
                | ServerError::NotFound(_)
                | ServerError::AlreadyExists(_)
        )
    }

    /// Returns true if the failure is on the server side.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            ServerError::Unavailable(_) | ServerError::Fault(_) | ServerError::WatchLagged(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::NotFound(ResourceKey::new("acct", "vpc1")).is_client_error());
        assert!(ServerError::Fault("injected".into()).is_server_error());
        assert!(!ServerError::InvalidRequest("bad".into()).is_server_error());
    }

    #[test]
    fn error_display() {
        let err = ServerError::VersionTooOld {
            requested: ResourceVersion::from_sequence(3),
            oldest: ResourceVersion::from_sequence(10),
        };
        let msg = err.to_string();
        assert!(msg.contains("00000000000000000003"));
        assert!(msg.contains("00000000000000000010"));

        let err = ServerError::AlreadyExists(ResourceKey::new("acct", "vpc1"));
        assert!(err.to_string().contains("acct/vpc1"));
    }
}
