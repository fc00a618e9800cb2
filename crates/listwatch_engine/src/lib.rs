//! # List-Watch Engine
//!
//! Keeps a local cache synchronized with a remote resource API.
//!
//! This crate provides:
//! - Delta decoding with wire-contract checks
//! - The List operation (bounded-time full snapshot)
//! - The Watch operation (ordered delta stream after a version)
//! - The synchronization loop (list → watch → relist)
//! - Retry with exponential backoff
//! - Liveness tracking
//! - Cache sink abstraction with an in-memory implementation
//!
//! ## Architecture
//!
//! The loop implements a **list-then-watch** model:
//! 1. List a complete snapshot, terminated by a bookmark
//! 2. Replace the cache contents with the snapshot
//! 3. Watch for deltas after the bookmark's version, applying each in order
//! 4. When the watch ends for any reason, go back to 1
//!
//! The remote API offers no durable replay log, so resuming a watch is never
//! attempted; the full replace after every relist is what keeps the cache
//! correct.
//!
//! ## Key Invariants
//!
//! - A failed List never touches the cache
//! - Watch deltas are applied synchronously in arrival order
//! - Bookmarks advance the known version but never mutate the cache
//! - Exactly one remote stream is open per loop
//! - Cancellation is the only error surfaced to callers

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod decoder;
mod error;
mod health;
mod list;
mod sink;
mod state;
mod transport;
mod watch;

pub use config::{ListWatchConfig, RetryConfig};
pub use decoder::{decode, Delta};
pub use error::{SyncError, SyncResult};
pub use health::{WatchHealth, DEFAULT_MAX_SILENCE};
pub use list::{list, ListResult};
pub use sink::{CacheSink, MemorySink};
pub use state::{ListWatcher, PhaseEvent, SyncPhase, SyncState, SyncStats, SyncStatus};
pub use transport::{DeltaStream, MockResourceApi, ResourceApi, ScriptedStream};
pub use watch::Watch;

/// Engine version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
