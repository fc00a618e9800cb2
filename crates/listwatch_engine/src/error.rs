//! Error types for the list-watch engine.

use std::time::Duration;
use thiserror::Error;

/// Result type for list-watch operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while synchronizing a cache.
///
/// Everything except `Cancelled` is recovered inside the synchronization
/// loop by relisting; cache consumers never observe these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Connection or RPC-level failure.
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// Stream closed with an application-level error.
    #[error("remote fault: {0}")]
    RemoteFault(String),

    /// A delta violated the wire contract.
    #[error("malformed delta: {0}")]
    Protocol(String),

    /// List did not reach its bookmark in time.
    #[error("list did not complete within {0:?}")]
    Timeout(Duration),

    /// Watch delivered nothing for longer than the configured idle bound.
    #[error("watch idle for longer than {0:?}")]
    WatchIdle(Duration),

    /// Caller-initiated shutdown.
    #[error("sync cancelled")]
    Cancelled,

    /// No successful list or watch response recently.
    #[error("last successful response was {age:?} ago")]
    Stale {
        /// Time since the last successful response.
        age: Duration,
    },

    /// The cache sink rejected a mutation.
    #[error("cache sink error: {0}")]
    Sink(String),

    /// Invalid state transition.
    #[error("invalid transition from {from} on {event}")]
    InvalidTransition {
        /// Current phase.
        from: String,
        /// Event that has no transition from `from`.
        event: String,
    },
}

impl SyncError {
    /// Returns true if the synchronization loop recovers from this error by
    /// relisting.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            SyncError::Cancelled | SyncError::InvalidTransition { .. }
        )
    }

    /// Returns true if this error is a List timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SyncError::Timeout(_))
    }
}
