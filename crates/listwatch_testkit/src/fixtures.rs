//! Test fixtures and sink helpers.
//!
//! Provides VPC builders, a sink that records every call it receives, and
//! polling helpers for asynchronous assertions.

use listwatch_engine::{CacheSink, MemorySink, SyncResult};
use listwatch_protocol::{Resource, ResourceKey, ResourceVersion, Vpc};
use parking_lot::Mutex;
use std::time::Duration;

/// Account used by fixtures unless a test needs several.
pub const TEST_ACCOUNT: &str = "123456789012";

/// Creates an unversioned VPC in the test account.
pub fn vpc(name: &str) -> Vpc {
    Vpc::new(TEST_ACCOUNT, name)
        .with_cidr_block("10.0.0.0/16")
        .with_region("us-west-2")
}

/// Creates a VPC in the test account at a given version.
pub fn vpc_at(name: &str, version: &str) -> Vpc {
    vpc(name).with_resource_version(version)
}

/// Returns the key of a VPC in the test account.
pub fn vpc_key(name: &str) -> ResourceKey {
    ResourceKey::new(TEST_ACCOUNT, name)
}

/// One call received by a [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    /// Full replace with these keys.
    Replace {
        /// Keys in the snapshot, in order.
        keys: Vec<ResourceKey>,
        /// Snapshot version.
        version: ResourceVersion,
    },
    /// Object added.
    Add(ResourceKey, ResourceVersion),
    /// Object updated.
    Update(ResourceKey, ResourceVersion),
    /// Object deleted.
    Delete(ResourceKey, ResourceVersion),
    /// Initial sync signalled.
    MarkSynced,
}

impl SinkCall {
    /// Returns true for calls that change cache contents.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, SinkCall::MarkSynced)
    }
}

/// A cache sink that records every call before applying it to an
/// in-memory cache.
pub struct RecordingSink<R> {
    cache: MemorySink<R>,
    calls: Mutex<Vec<SinkCall>>,
}

impl<R: Resource> RecordingSink<R> {
    /// Creates an empty recording sink.
    pub fn new() -> Self {
        Self {
            cache: MemorySink::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Returns the materialized cache.
    pub fn cache(&self) -> &MemorySink<R> {
        &self.cache
    }

    /// Returns every call received so far.
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    /// Returns how many times `mark_synced` was called.
    pub fn synced_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| **call == SinkCall::MarkSynced)
            .count()
    }

    fn record(&self, call: SinkCall) {
        self.calls.lock().push(call);
    }
}

impl<R: Resource> Default for RecordingSink<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Resource> CacheSink<R> for RecordingSink<R> {
    fn replace(&self, items: Vec<R>, resource_version: &ResourceVersion) -> SyncResult<()> {
        self.record(SinkCall::Replace {
            keys: items.iter().map(Resource::key).collect(),
            version: resource_version.clone(),
        });
        self.cache.replace(items, resource_version)
    }

    fn add(&self, object: R) -> SyncResult<()> {
        self.record(SinkCall::Add(
            object.key(),
            object.resource_version().clone(),
        ));
        self.cache.add(object)
    }

    fn update(&self, object: R) -> SyncResult<()> {
        self.record(SinkCall::Update(
            object.key(),
            object.resource_version().clone(),
        ));
        self.cache.update(object)
    }

    fn delete(&self, key: &ResourceKey, resource_version: &ResourceVersion) -> SyncResult<()> {
        self.record(SinkCall::Delete(key.clone(), resource_version.clone()));
        self.cache.delete(key, resource_version)
    }

    fn mark_synced(&self) -> SyncResult<()> {
        self.record(SinkCall::MarkSynced);
        self.cache.mark_synced()
    }
}

/// Polls `condition` every few milliseconds until it holds or `timeout`
/// elapses. Returns whether it held.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
