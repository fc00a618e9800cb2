//! Server configuration.

use std::time::Duration;

/// Configuration for the resource server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Capacity of the live change broadcast. A watcher that falls further
    /// behind than this ends with `WatchLagged`.
    pub event_buffer: usize,
    /// Capacity of each response stream's channel.
    pub stream_buffer: usize,
    /// Number of changes retained for watch replay.
    pub log_retention: usize,
    /// Interval between bookmarks on idle watches. `None` disables them.
    pub bookmark_interval: Option<Duration>,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new() -> Self {
        Self {
            event_buffer: 1024,
            stream_buffer: 256,
            log_retention: 4096,
            bookmark_interval: None,
        }
    }

    /// Sets the broadcast capacity.
    pub fn with_event_buffer(mut self, size: usize) -> Self {
        self.event_buffer = size;
        self
    }

    /// Sets the per-stream channel capacity.
    pub fn with_stream_buffer(mut self, size: usize) -> Self {
        self.stream_buffer = size;
        self
    }

    /// Sets the number of retained changes.
    pub fn with_log_retention(mut self, size: usize) -> Self {
        self.log_retention = size;
        self
    }

    /// Enables periodic bookmarks on watches.
    pub fn with_bookmark_interval(mut self, interval: Duration) -> Self {
        self.bookmark_interval = Some(interval);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
