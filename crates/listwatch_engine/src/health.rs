//! Liveness tracking for a synchronization loop.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default bound used by health checks.
pub const DEFAULT_MAX_SILENCE: Duration = Duration::from_secs(10);

/// Records when the loop last received a successful response.
///
/// A successful List, and every Watch delta including bookmarks, counts as
/// a success. Cloning shares the underlying timestamp.
#[derive(Debug, Clone)]
pub struct WatchHealth {
    last_success: Arc<Mutex<Instant>>,
}

impl WatchHealth {
    /// Creates a tracker whose clock starts now.
    pub fn new() -> Self {
        Self {
            last_success: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Records a successful response.
    pub fn record_success(&self) {
        *self.last_success.lock() = Instant::now();
    }

    /// Returns the time since the last successful response.
    pub fn since_last_success(&self) -> Duration {
        self.last_success.lock().elapsed()
    }

    /// Fails with `Stale` if nothing succeeded within `max_age`.
    pub fn check(&self, max_age: Duration) -> SyncResult<()> {
        let age = self.since_last_success();
        if age > max_age {
            Err(SyncError::Stale { age })
        } else {
            Ok(())
        }
    }
}

impl Default for WatchHealth {
    fn default() -> Self {
        Self::new()
    }
}
