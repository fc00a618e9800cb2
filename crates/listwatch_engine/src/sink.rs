//! Cache sinks receiving synchronized state.

use crate::error::SyncResult;
use listwatch_protocol::{Resource, ResourceKey, ResourceVersion};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tokio::sync::watch;

/// Receives cache mutations from a `ListWatcher`.
///
/// Calls are made from a single task, in stream order. An error from any
/// method causes the loop to relist.
pub trait CacheSink<R>: Send + Sync {
    /// Replaces the entire cache contents with a List snapshot.
    fn replace(&self, items: Vec<R>, resource_version: &ResourceVersion) -> SyncResult<()>;

    /// Inserts a new object.
    fn add(&self, object: R) -> SyncResult<()>;

    /// Replaces an existing object.
    fn update(&self, object: R) -> SyncResult<()>;

    /// Removes an object.
    fn delete(&self, key: &ResourceKey, resource_version: &ResourceVersion) -> SyncResult<()>;

    /// Called once, after the first successful List has been applied.
    fn mark_synced(&self) -> SyncResult<()>;
}

/// An in-memory cache keyed by resource key.
pub struct MemorySink<R> {
    objects: RwLock<BTreeMap<ResourceKey, R>>,
    synced: watch::Sender<bool>,
}

impl<R: Resource> MemorySink<R> {
    /// Creates an empty, unsynced cache.
    pub fn new() -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            objects: RwLock::new(BTreeMap::new()),
            synced,
        }
    }

    /// Returns the cached object for `key`.
    pub fn get(&self, key: &ResourceKey) -> Option<R> {
        self.objects.read().get(key).cloned()
    }

    /// Returns all cached objects ordered by key.
    pub fn list(&self) -> Vec<R> {
        self.objects.read().values().cloned().collect()
    }

    /// Returns all cached keys in order.
    pub fn keys(&self) -> Vec<ResourceKey> {
        self.objects.read().keys().cloned().collect()
    }

    /// Returns the number of cached objects.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns true if the cache holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Returns true once the first List has been applied.
    pub fn has_synced(&self) -> bool {
        *self.synced.borrow()
    }

    /// Waits until the first List has been applied.
    pub async fn wait_for_sync(&self) {
        let mut synced = self.synced.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = synced.wait_for(|synced| *synced).await;
    }
}

impl<R: Resource> Default for MemorySink<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Resource> CacheSink<R> for MemorySink<R> {
    fn replace(&self, items: Vec<R>, _resource_version: &ResourceVersion) -> SyncResult<()> {
        let objects = items.into_iter().map(|object| (object.key(), object)).collect();
        *self.objects.write() = objects;
        Ok(())
    }

    fn add(&self, object: R) -> SyncResult<()> {
        self.objects.write().insert(object.key(), object);
        Ok(())
    }

    fn update(&self, object: R) -> SyncResult<()> {
        self.objects.write().insert(object.key(), object);
        Ok(())
    }

    fn delete(&self, key: &ResourceKey, _resource_version: &ResourceVersion) -> SyncResult<()> {
        self.objects.write().remove(key);
        Ok(())
    }

    fn mark_synced(&self) -> SyncResult<()> {
        self.synced.send_replace(true);
        Ok(())
    }
}
