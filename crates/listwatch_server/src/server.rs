//! Resource API server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::faults::{FaultInjector, ListFault};
use crate::store::{Change, ResourceStore};
use crate::stream::ResponseStream;
use listwatch_protocol::{
    Resource, ResourceKey, ResourceVersion, SearchStreamRequest, WatchRequest, WatchResponse,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, Interval};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A stream of deltas served to one client call.
pub type ServerStream<R> = ResponseStream<ServerResult<WatchResponse<R>>>;

/// In-memory implementation of the remote resource API.
///
/// Serves `SearchStream` and `Watch` calls from a [`ResourceStore`]. Each
/// call is backed by its own task; dropping the returned stream ends it.
///
/// # Example
///
/// ```
/// use listwatch_protocol::Vpc;
/// use listwatch_server::{ResourceServer, ServerConfig};
///
/// let server: ResourceServer<Vpc> = ResourceServer::new(ServerConfig::default());
/// server.create(Vpc::new("123456789012", "vpc1")).unwrap();
/// assert_eq!(server.len(), 1);
/// ```
pub struct ResourceServer<R> {
    config: ServerConfig,
    store: Arc<ResourceStore<R>>,
    faults: Arc<FaultInjector>,
    open_streams: Arc<AtomicUsize>,
}

impl<R: Resource> ResourceServer<R> {
    /// Creates a new server.
    pub fn new(config: ServerConfig) -> Self {
        let store = Arc::new(ResourceStore::new(config.event_buffer, config.log_retention));
        Self {
            config,
            store,
            faults: Arc::new(FaultInjector::new()),
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the number of calls whose serving task is still running.
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    /// Returns the fault injection hooks.
    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Returns the backing store.
    pub fn store(&self) -> &ResourceStore<R> {
        &self.store
    }

    /// Creates a resource.
    pub fn create(&self, object: R) -> ServerResult<R> {
        self.store.create(object)
    }

    /// Updates a resource.
    pub fn update(&self, object: R) -> ServerResult<R> {
        self.store.update(object)
    }

    /// Creates or updates a resource.
    pub fn put(&self, object: R) -> R {
        self.store.put(object)
    }

    /// Deletes a resource.
    pub fn delete(&self, key: &ResourceKey) -> ServerResult<R> {
        self.store.delete(key)
    }

    /// Returns a resource by key.
    pub fn get(&self, key: &ResourceKey) -> Option<R> {
        self.store.get(key)
    }

    /// Returns the number of resources.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns true if there are no resources.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Returns the current snapshot and its version.
    pub fn snapshot(&self, account_id: Option<&str>) -> (Vec<R>, ResourceVersion) {
        self.store.snapshot(account_id)
    }

    /// Handles a `SearchStream` call.
    ///
    /// Streams every matching resource as `Added`, then a bookmark carrying
    /// the snapshot's version. Must be called from within a tokio runtime.
    pub fn handle_search_stream(&self, request: SearchStreamRequest) -> ServerResult<ServerStream<R>> {
        self.check_available()?;

        let fault = self.faults.take_list_fault();
        let (items, version) = self.store.snapshot(request.cloud_account_id.as_deref());
        debug!(
            items = items.len(),
            version = %version,
            hint = %request.resource_version,
            ?fault,
            "serving search stream"
        );

        let faults = Arc::clone(&self.faults);
        let guard = self.track_stream();
        Ok(ResponseStream::spawn(self.config.stream_buffer, move |sender| async move {
            let _guard = guard;
            match fault {
                ListFault::Fail => {
                    let _ = sender
                        .send(Err(ServerError::Fault("injected list failure".into())))
                        .await;
                    return;
                }
                ListFault::Stall => {
                    // Hold the call open without sending anything.
                    let _sender = sender;
                    std::future::pending::<()>().await;
                    return;
                }
                ListFault::None => {}
            }

            for item in items {
                if !deliver(&sender, &faults, WatchResponse::added(item)).await {
                    return;
                }
            }
            let _ = sender.send(Ok(WatchResponse::bookmark(version))).await;
        }))
    }

    /// Handles a `Watch` call.
    ///
    /// Replays retained changes after `request.resource_version`, then
    /// follows live changes until the client goes away, the watcher lags,
    /// or a fault aborts it. Must be called from within a tokio runtime.
    pub fn handle_watch(&self, request: WatchRequest) -> ServerResult<ServerStream<R>> {
        self.check_available()?;

        let account_id = request.cloud_account_id.clone();
        let (backlog, receiver) = self
            .store
            .watch_from(&request.resource_version, account_id.as_deref())?;
        let since = request.resource_version.sequence().unwrap_or_default();
        debug!(
            since = %request.resource_version,
            backlog = backlog.len(),
            "serving watch"
        );

        let watch = WatchTask {
            faults: Arc::clone(&self.faults),
            abort: self.faults.watch_abort_token(),
            account_id,
            last_seen: since,
            bookmark_interval: self.config.bookmark_interval,
            _guard: self.track_stream(),
        };
        Ok(ResponseStream::spawn(self.config.stream_buffer, move |sender| {
            watch.run(sender, backlog, receiver)
        }))
    }

    fn track_stream(&self) -> StreamGuard {
        self.open_streams.fetch_add(1, Ordering::SeqCst);
        StreamGuard(Arc::clone(&self.open_streams))
    }

    fn check_available(&self) -> ServerResult<()> {
        if self.faults.is_unavailable() {
            Err(ServerError::Unavailable("injected unavailability".into()))
        } else {
            Ok(())
        }
    }
}

impl<R: Resource> Default for ResourceServer<R> {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

/// Counts one serving task; released when the task finishes or is aborted.
struct StreamGuard(Arc<AtomicUsize>);

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct WatchTask {
    _guard: StreamGuard,
    faults: Arc<FaultInjector>,
    abort: CancellationToken,
    account_id: Option<String>,
    last_seen: u64,
    bookmark_interval: Option<Duration>,
}

impl WatchTask {
    async fn run<R: Resource>(
        mut self,
        sender: mpsc::Sender<ServerResult<WatchResponse<R>>>,
        backlog: Vec<Change<R>>,
        mut receiver: broadcast::Receiver<Change<R>>,
    ) {
        for change in backlog {
            if !self.forward(&sender, change).await {
                return;
            }
        }

        let mut ticker = self
            .bookmark_interval
            .map(|period| tokio::time::interval_at(Instant::now() + period, period));

        loop {
            tokio::select! {
                biased;
                _ = self.abort.cancelled() => {
                    let _ = sender
                        .send(Err(ServerError::Fault("watch aborted".into())))
                        .await;
                    return;
                }
                received = receiver.recv() => match received {
                    Ok(change) => {
                        if !self.forward(&sender, change).await {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        let _ = sender.send(Err(ServerError::WatchLagged(missed))).await;
                        return;
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                },
                _ = next_tick(&mut ticker) => {
                    let bookmark = WatchResponse::bookmark(ResourceVersion::from_sequence(self.last_seen));
                    if sender.send(Ok(bookmark)).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Sends one change if the watcher has not seen it and it passes the
    /// account filter. Returns false once the stream is over.
    async fn forward<R: Resource>(
        &mut self,
        sender: &mpsc::Sender<ServerResult<WatchResponse<R>>>,
        change: Change<R>,
    ) -> bool {
        if change.sequence <= self.last_seen {
            return true;
        }
        self.last_seen = change.sequence;
        if !change.matches(self.account_id.as_deref()) {
            return true;
        }
        deliver(sender, &self.faults, change.delta).await
    }
}

/// Sends a delta, or a fault if its resource name is armed for abort.
/// Returns false once the stream is over.
async fn deliver<R>(
    sender: &mpsc::Sender<ServerResult<WatchResponse<R>>>,
    faults: &FaultInjector,
    delta: WatchResponse<R>,
) -> bool {
    if let Some(key) = &delta.key {
        if faults.should_abort(&key.name) {
            let _ = sender
                .send(Err(ServerError::Fault(format!(
                    "injected fault on resource {key}"
                ))))
                .await;
            return false;
        }
    }
    sender.send(Ok(delta)).await.is_ok()
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use listwatch_protocol::{Vpc, WatchDeltaType};

    const WAIT: Duration = Duration::from_secs(5);

    async fn next<R: Resource>(stream: &mut ServerStream<R>) -> Option<ServerResult<WatchResponse<R>>> {
        tokio::time::timeout(WAIT, stream.next())
            .await
            .expect("stream stalled")
    }

    #[tokio::test]
    async fn search_stream_ends_with_bookmark() {
        let server = ResourceServer::default();
        server.create(Vpc::new("acct", "vpc1")).unwrap();
        server.create(Vpc::new("acct", "vpc2")).unwrap();

        let mut stream = server.handle_search_stream(SearchStreamRequest::new()).unwrap();
        let first = next(&mut stream).await.unwrap().unwrap();
        let second = next(&mut stream).await.unwrap().unwrap();
        let bookmark = next(&mut stream).await.unwrap().unwrap();

        assert_eq!(first.delta_type, WatchDeltaType::Added);
        assert_eq!(second.delta_type, WatchDeltaType::Added);
        assert!(bookmark.is_bookmark());
        assert_eq!(bookmark.resource_version, ResourceVersion::from_sequence(2));
        assert!(next(&mut stream).await.is_none());
    }

    #[tokio::test]
    async fn search_stream_filters_by_account() {
        let server = ResourceServer::default();
        server.put(Vpc::new("a", "vpc1"));
        server.put(Vpc::new("b", "vpc2"));

        let mut stream = server
            .handle_search_stream(SearchStreamRequest::new().with_cloud_account_id("b"))
            .unwrap();
        let only = next(&mut stream).await.unwrap().unwrap();
        assert_eq!(only.key, Some(ResourceKey::new("b", "vpc2")));
        assert!(next(&mut stream).await.unwrap().unwrap().is_bookmark());
    }

    #[tokio::test]
    async fn unavailable_refuses_calls() {
        let server: ResourceServer<Vpc> = ResourceServer::default();
        server.faults().set_unavailable(true);

        assert!(matches!(
            server.handle_search_stream(SearchStreamRequest::new()),
            Err(ServerError::Unavailable(_))
        ));
        assert!(matches!(
            server.handle_watch(WatchRequest::default()),
            Err(ServerError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn injected_list_failure() {
        let server = ResourceServer::default();
        server.put(Vpc::new("acct", "vpc1"));
        server.faults().fail_next_lists(1);

        let mut stream = server.handle_search_stream(SearchStreamRequest::new()).unwrap();
        assert!(matches!(next(&mut stream).await, Some(Err(ServerError::Fault(_)))));

        let mut stream = server.handle_search_stream(SearchStreamRequest::new()).unwrap();
        assert!(next(&mut stream).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn stalled_list_sends_nothing() {
        let server: ResourceServer<Vpc> = ResourceServer::default();
        server.faults().stall_next_lists(1);

        let mut stream = server.handle_search_stream(SearchStreamRequest::new()).unwrap();
        let result = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn dropped_streams_release_their_tasks() {
        let server: ResourceServer<Vpc> = ResourceServer::default();
        server.faults().stall_next_lists(1);

        let list = server.handle_search_stream(SearchStreamRequest::new()).unwrap();
        let watch = server.handle_watch(WatchRequest::default()).unwrap();
        assert_eq!(server.open_streams(), 2);

        drop(list);
        drop(watch);
        tokio::time::timeout(WAIT, async {
            while server.open_streams() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("serving tasks still running");
    }

    #[tokio::test]
    async fn completed_list_releases_its_task() {
        let server: ResourceServer<Vpc> = ResourceServer::default();
        server.create(Vpc::new("acct", "vpc1")).unwrap();

        let mut stream = server.handle_search_stream(SearchStreamRequest::new()).unwrap();
        while next(&mut stream).await.is_some() {}
        assert_eq!(server.open_streams(), 0);
    }

    #[tokio::test]
    async fn watch_replays_then_follows() {
        let server = ResourceServer::default();
        let created = server.create(Vpc::new("acct", "vpc1")).unwrap();
        server.update(created.clone().with_cidr_block("10.0.0.0/16")).unwrap();

        let mut stream = server
            .handle_watch(WatchRequest::new(created.metadata.resource_version.clone()))
            .unwrap();
        let replayed = next(&mut stream).await.unwrap().unwrap();
        assert_eq!(replayed.delta_type, WatchDeltaType::Updated);
        assert_eq!(replayed.resource_version, ResourceVersion::from_sequence(2));

        server.delete(&ResourceKey::new("acct", "vpc1")).unwrap();
        let live = next(&mut stream).await.unwrap().unwrap();
        assert_eq!(live.delta_type, WatchDeltaType::Deleted);
        assert_eq!(live.resource_version, ResourceVersion::from_sequence(3));
    }

    #[tokio::test]
    async fn watch_skips_other_accounts() {
        let server = ResourceServer::default();
        let mut stream = server
            .handle_watch(WatchRequest::new(server.store().current_version()).with_cloud_account_id("a"))
            .unwrap();

        server.put(Vpc::new("b", "vpc1"));
        server.put(Vpc::new("a", "vpc2"));

        let delta = next(&mut stream).await.unwrap().unwrap();
        assert_eq!(delta.key, Some(ResourceKey::new("a", "vpc2")));
    }

    #[tokio::test]
    async fn abort_watches_ends_open_streams() {
        let server: ResourceServer<Vpc> = ResourceServer::default();
        let mut stream = server.handle_watch(WatchRequest::default()).unwrap();

        server.faults().abort_watches();
        assert!(matches!(next(&mut stream).await, Some(Err(ServerError::Fault(_)))));
        assert!(next(&mut stream).await.is_none());

        let mut fresh = server.handle_watch(WatchRequest::default()).unwrap();
        server.put(Vpc::new("acct", "vpc1"));
        assert!(next(&mut fresh).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn abort_on_name_faults_delivery() {
        let server = ResourceServer::default();
        server.faults().abort_on_name(Some("boom".into()));
        let mut stream = server.handle_watch(WatchRequest::default()).unwrap();

        server.put(Vpc::new("acct", "vpc1"));
        server.put(Vpc::new("acct", "boom"));

        assert!(next(&mut stream).await.unwrap().is_ok());
        assert!(matches!(next(&mut stream).await, Some(Err(ServerError::Fault(_)))));
        assert!(next(&mut stream).await.is_none());
    }

    #[tokio::test]
    async fn watch_from_trimmed_version_fails() {
        let server = ResourceServer::new(ServerConfig::new().with_log_retention(2));
        for i in 0..5 {
            server.put(Vpc::new("acct", format!("vpc{i}")));
        }

        let result = server.handle_watch(WatchRequest::new(ResourceVersion::from_sequence(1)));
        assert!(matches!(result, Err(ServerError::VersionTooOld { .. })));
    }

    #[tokio::test]
    async fn lagging_watcher_is_ended() {
        let server = ResourceServer::new(ServerConfig::new().with_event_buffer(2).with_stream_buffer(1));
        let mut stream = server.handle_watch(WatchRequest::new(server.store().current_version())).unwrap();

        for i in 0..16 {
            server.put(Vpc::new("acct", format!("vpc{i}")));
        }

        let mut lagged = false;
        while let Some(item) = next(&mut stream).await {
            if let Err(ServerError::WatchLagged(_)) = item {
                lagged = true;
            }
        }
        assert!(lagged);
    }

    #[tokio::test]
    async fn idle_watch_gets_bookmarks() {
        let server = ResourceServer::new(
            ServerConfig::new().with_bookmark_interval(Duration::from_millis(20)),
        );
        server.put(Vpc::new("acct", "vpc1"));
        let version = server.store().current_version();

        let mut stream = server.handle_watch(WatchRequest::new(version.clone())).unwrap();
        let bookmark = next(&mut stream).await.unwrap().unwrap();
        assert!(bookmark.is_bookmark());
        assert_eq!(bookmark.resource_version, version);
    }
}
