//! Versioned in-memory resource store.

use crate::error::{ServerError, ServerResult};
use listwatch_protocol::{Resource, ResourceKey, ResourceVersion, WatchResponse};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::broadcast;

/// One committed change.
#[derive(Debug, Clone, PartialEq)]
pub struct Change<R> {
    /// Commit sequence; the change's version is minted from it.
    pub sequence: u64,
    /// Wire delta describing the change.
    pub delta: WatchResponse<R>,
}

impl<R> Change<R> {
    /// Returns the account of the changed resource.
    pub fn account_id(&self) -> Option<&str> {
        self.delta.key.as_ref().map(|key| key.account_id.as_str())
    }

    /// Returns true if the change passes an optional account filter.
    pub fn matches(&self, account_id: Option<&str>) -> bool {
        account_id.map_or(true, |account| self.account_id() == Some(account))
    }
}

struct Inner<R> {
    objects: BTreeMap<ResourceKey, R>,
    next_sequence: u64,
    log: VecDeque<Change<R>>,
}

/// Resource store with a monotonically versioned change log.
///
/// Every mutation takes the next sequence number, is appended to a bounded
/// log and broadcast to live watchers while the store lock is held, so a
/// watcher can replay the log and subscribe without gaps or duplicates.
pub struct ResourceStore<R> {
    inner: Mutex<Inner<R>>,
    events: broadcast::Sender<Change<R>>,
    log_retention: usize,
}

impl<R: Resource> ResourceStore<R> {
    /// Creates an empty store.
    pub fn new(event_buffer: usize, log_retention: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            inner: Mutex::new(Inner {
                objects: BTreeMap::new(),
                next_sequence: 1,
                log: VecDeque::new(),
            }),
            events,
            log_retention,
        }
    }

    /// Inserts a new resource.
    pub fn create(&self, object: R) -> ServerResult<R> {
        let mut inner = self.inner.lock();
        let key = object.key();
        if inner.objects.contains_key(&key) {
            return Err(ServerError::AlreadyExists(key));
        }
        Ok(self.commit_object(&mut inner, object, false))
    }

    /// Replaces an existing resource.
    pub fn update(&self, object: R) -> ServerResult<R> {
        let mut inner = self.inner.lock();
        let key = object.key();
        if !inner.objects.contains_key(&key) {
            return Err(ServerError::NotFound(key));
        }
        Ok(self.commit_object(&mut inner, object, true))
    }

    /// Creates or replaces a resource.
    pub fn put(&self, object: R) -> R {
        let mut inner = self.inner.lock();
        let exists = inner.objects.contains_key(&object.key());
        self.commit_object(&mut inner, object, exists)
    }

    /// Removes a resource, returning its last state.
    pub fn delete(&self, key: &ResourceKey) -> ServerResult<R> {
        let mut inner = self.inner.lock();
        let removed = inner
            .objects
            .remove(key)
            .ok_or_else(|| ServerError::NotFound(key.clone()))?;
        let sequence = Self::next_sequence(&mut inner);
        let delta = WatchResponse::deleted(key.clone(), ResourceVersion::from_sequence(sequence));
        self.record(&mut inner, Change { sequence, delta });
        Ok(removed)
    }

    /// Returns a resource by key.
    pub fn get(&self, key: &ResourceKey) -> Option<R> {
        self.inner.lock().objects.get(key).cloned()
    }

    /// Returns the number of stored resources.
    pub fn len(&self) -> usize {
        self.inner.lock().objects.len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().objects.is_empty()
    }

    /// Returns the version of the latest committed change.
    pub fn current_version(&self) -> ResourceVersion {
        let inner = self.inner.lock();
        ResourceVersion::from_sequence(inner.next_sequence - 1)
    }

    /// Returns a consistent snapshot and the version it reflects.
    pub fn snapshot(&self, account_id: Option<&str>) -> (Vec<R>, ResourceVersion) {
        let inner = self.inner.lock();
        let items = inner
            .objects
            .iter()
            .filter(|(key, _)| account_id.map_or(true, |account| key.account_id == account))
            .map(|(_, object)| object.clone())
            .collect();
        (items, ResourceVersion::from_sequence(inner.next_sequence - 1))
    }

    /// Returns retained changes after `version` and a subscription to all
    /// later ones.
    ///
    /// Fails with `VersionTooOld` when changes after `version` have already
    /// been trimmed from the log.
    pub fn watch_from(
        &self,
        version: &ResourceVersion,
        account_id: Option<&str>,
    ) -> ServerResult<(Vec<Change<R>>, broadcast::Receiver<Change<R>>)> {
        let since = version.sequence().ok_or_else(|| {
            ServerError::InvalidRequest(format!("unparseable resource version {version:?}"))
        })?;

        let inner = self.inner.lock();
        let oldest = inner
            .log
            .front()
            .map_or(inner.next_sequence, |change| change.sequence);
        if since.saturating_add(1) < oldest {
            return Err(ServerError::VersionTooOld {
                requested: version.clone(),
                oldest: ResourceVersion::from_sequence(oldest - 1),
            });
        }

        let backlog = inner
            .log
            .iter()
            .filter(|change| change.sequence > since && change.matches(account_id))
            .cloned()
            .collect();
        let receiver = self.events.subscribe();
        Ok((backlog, receiver))
    }

    fn commit_object(&self, inner: &mut Inner<R>, mut object: R, exists: bool) -> R {
        let sequence = Self::next_sequence(inner);
        object.set_resource_version(ResourceVersion::from_sequence(sequence));
        inner.objects.insert(object.key(), object.clone());

        let delta = if exists {
            WatchResponse::updated(object.clone())
        } else {
            WatchResponse::added(object.clone())
        };
        self.record(inner, Change { sequence, delta });
        object
    }

    fn next_sequence(inner: &mut Inner<R>) -> u64 {
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        sequence
    }

    fn record(&self, inner: &mut Inner<R>, change: Change<R>) {
        inner.log.push_back(change.clone());
        while inner.log.len() > self.log_retention {
            inner.log.pop_front();
        }
        // No subscribers is fine.
        let _ = self.events.send(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listwatch_protocol::{Vpc, WatchDeltaType};

    fn store() -> ResourceStore<Vpc> {
        ResourceStore::new(16, 8)
    }

    #[test]
    fn versions_increase_per_mutation() {
        let store = store();
        assert_eq!(store.current_version(), ResourceVersion::from_sequence(0));

        let a = store.create(Vpc::new("acct", "vpc1")).unwrap();
        let b = store.update(Vpc::new("acct", "vpc1").with_cidr_block("10.0.0.0/16")).unwrap();

        assert_eq!(a.metadata.resource_version, ResourceVersion::from_sequence(1));
        assert_eq!(b.metadata.resource_version, ResourceVersion::from_sequence(2));
        assert!(a.metadata.resource_version < b.metadata.resource_version);
        assert_eq!(store.current_version(), ResourceVersion::from_sequence(2));
    }

    #[test]
    fn create_and_update_preconditions() {
        let store = store();
        store.create(Vpc::new("acct", "vpc1")).unwrap();

        assert!(matches!(
            store.create(Vpc::new("acct", "vpc1")),
            Err(ServerError::AlreadyExists(_))
        ));
        assert!(matches!(
            store.update(Vpc::new("acct", "vpc2")),
            Err(ServerError::NotFound(_))
        ));
        assert!(matches!(
            store.delete(&ResourceKey::new("acct", "vpc2")),
            Err(ServerError::NotFound(_))
        ));
    }

    #[test]
    fn snapshot_filters_by_account() {
        let store = store();
        store.put(Vpc::new("a", "vpc1"));
        store.put(Vpc::new("b", "vpc2"));
        store.put(Vpc::new("a", "vpc3"));

        let (all, version) = store.snapshot(None);
        assert_eq!(all.len(), 3);
        assert_eq!(version, ResourceVersion::from_sequence(3));

        let (only_a, _) = store.snapshot(Some("a"));
        let names: Vec<_> = only_a.iter().map(|v| v.metadata.name.as_str()).collect();
        assert_eq!(names, vec!["vpc1", "vpc3"]);
    }

    #[test]
    fn watch_replays_backlog_after_version() {
        let store = store();
        store.put(Vpc::new("acct", "vpc1"));
        store.put(Vpc::new("acct", "vpc2"));
        store.delete(&ResourceKey::new("acct", "vpc1")).unwrap();

        let (backlog, _receiver) = store
            .watch_from(&ResourceVersion::from_sequence(1), None)
            .unwrap();
        let kinds: Vec<_> = backlog.iter().map(|c| c.delta.delta_type).collect();
        assert_eq!(kinds, vec![WatchDeltaType::Added, WatchDeltaType::Deleted]);
        assert_eq!(backlog[1].sequence, 3);
    }

    #[test]
    fn empty_version_replays_everything_retained() {
        let store = store();
        store.put(Vpc::new("acct", "vpc1"));

        let (backlog, _receiver) = store.watch_from(&ResourceVersion::default(), None).unwrap();
        assert_eq!(backlog.len(), 1);
    }

    #[test]
    fn trimmed_log_rejects_old_versions() {
        let store = store();
        for i in 0..20 {
            store.put(Vpc::new("acct", format!("vpc{i}")));
        }

        let result = store.watch_from(&ResourceVersion::from_sequence(2), None);
        assert!(matches!(result, Err(ServerError::VersionTooOld { .. })));

        let (backlog, _receiver) = store
            .watch_from(&ResourceVersion::from_sequence(12), None)
            .unwrap();
        assert_eq!(backlog.len(), 8);
    }

    #[test]
    fn unparseable_version_is_invalid() {
        let store = store();
        let result = store.watch_from(&ResourceVersion::new("not-a-number"), None);
        assert!(matches!(result, Err(ServerError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn subscription_receives_later_changes() {
        let store = store();
        store.put(Vpc::new("acct", "vpc1"));
        let (backlog, mut receiver) = store.watch_from(&store.current_version(), None).unwrap();
        assert!(backlog.is_empty());

        store.put(Vpc::new("acct", "vpc2"));
        let change = receiver.recv().await.unwrap();
        assert_eq!(change.sequence, 2);
        assert_eq!(change.delta.delta_type, WatchDeltaType::Added);
    }
}
