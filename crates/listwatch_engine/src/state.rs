//! Synchronization loop state machine.

use crate::config::ListWatchConfig;
use crate::decoder::Delta;
use crate::error::{SyncError, SyncResult};
use crate::health::WatchHealth;
use crate::list;
use crate::sink::CacheSink;
use crate::transport::ResourceApi;
use crate::watch::Watch;
use listwatch_protocol::{Resource, ResourceVersion, SearchStreamRequest, WatchRequest};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Phase of a synchronization loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Fetching a full snapshot.
    Listing,
    /// Streaming deltas after the last known version.
    Watching,
    /// Cancelled; no further transitions.
    Stopped,
}

/// Events driving phase transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// A List completed and its snapshot was applied.
    ListSucceeded,
    /// A List failed or timed out.
    ListFailed,
    /// A Watch ended, cleanly or by error.
    WatchEnded,
    /// The caller requested shutdown.
    Cancelled,
}

impl SyncPhase {
    /// Applies the transition table.
    pub fn transition(self, event: PhaseEvent) -> SyncResult<SyncPhase> {
        match (self, event) {
            (_, PhaseEvent::Cancelled) => Ok(SyncPhase::Stopped),
            (SyncPhase::Listing, PhaseEvent::ListSucceeded) => Ok(SyncPhase::Watching),
            (SyncPhase::Listing, PhaseEvent::ListFailed) => Ok(SyncPhase::Listing),
            (SyncPhase::Watching, PhaseEvent::WatchEnded) => Ok(SyncPhase::Listing),
            (from, event) => Err(SyncError::InvalidTransition {
                from: format!("{from:?}"),
                event: format!("{event:?}"),
            }),
        }
    }

    /// Returns true if no further transitions occur.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncPhase::Stopped)
    }
}

/// Loop-local synchronization state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    /// Version of the last applied snapshot, delta or bookmark.
    pub last_known_version: ResourceVersion,
    /// Current phase.
    pub phase: SyncPhase,
    /// Whether the first List has been applied.
    pub has_synced: bool,
}

impl SyncState {
    fn new() -> Self {
        Self {
            last_known_version: ResourceVersion::default(),
            phase: SyncPhase::Listing,
            has_synced: false,
        }
    }

    /// Returns true when relisting after an interrupted Watch.
    pub fn is_recovering(&self) -> bool {
        self.phase == SyncPhase::Listing && self.has_synced
    }
}

/// Counters describing a loop's history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Lists that completed and were applied.
    pub lists_succeeded: u64,
    /// Lists that failed, including timeouts.
    pub list_failures: u64,
    /// Lists that exceeded the List timeout.
    pub list_timeouts: u64,
    /// Watch calls opened.
    pub watches_started: u64,
    /// Watches that ended with an error.
    pub watch_failures: u64,
    /// Added, Updated and Deleted deltas applied to the sink.
    pub deltas_applied: u64,
    /// Bookmarks observed while watching.
    pub bookmarks_seen: u64,
    /// Returns to Listing after a Watch ended.
    pub relists: u64,
}

/// Snapshot of a loop, published after every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    /// Current phase.
    pub phase: SyncPhase,
    /// Last known version.
    pub last_known_version: ResourceVersion,
    /// Whether the first List has been applied.
    pub has_synced: bool,
    /// Loop counters.
    pub stats: SyncStats,
    /// Most recent recovered error.
    pub last_error: Option<String>,
}

/// Keeps a `CacheSink` synchronized with a remote resource API.
///
/// The loop lists, replaces the sink contents, watches from the listed
/// version, and relists whenever the watch ends. Only one remote stream is
/// open at a time.
pub struct ListWatcher<R, A: ?Sized, S: ?Sized> {
    config: ListWatchConfig,
    api: Arc<A>,
    sink: Arc<S>,
    state: SyncState,
    stats: SyncStats,
    last_error: Option<String>,
    failures: u32,
    health: WatchHealth,
    status: watch::Sender<SyncStatus>,
    _resource: PhantomData<fn() -> R>,
}

impl<R, A, S> ListWatcher<R, A, S>
where
    R: Resource,
    A: ResourceApi<R> + ?Sized,
    S: CacheSink<R> + ?Sized,
{
    /// Creates a new list-watcher.
    pub fn new(config: ListWatchConfig, api: Arc<A>, sink: Arc<S>) -> Self {
        let state = SyncState::new();
        let (status, _) = watch::channel(SyncStatus {
            phase: state.phase,
            last_known_version: state.last_known_version.clone(),
            has_synced: state.has_synced,
            stats: SyncStats::default(),
            last_error: None,
        });
        Self {
            config,
            api,
            sink,
            state,
            stats: SyncStats::default(),
            last_error: None,
            failures: 0,
            health: WatchHealth::new(),
            status,
            _resource: PhantomData,
        }
    }

    /// Subscribes to status snapshots.
    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Returns a handle on the loop's liveness.
    pub fn health(&self) -> WatchHealth {
        self.health.clone()
    }

    /// Returns the current state.
    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Runs the loop until `cancel` fires.
    ///
    /// All remote failures are recovered internally; the only error
    /// returned is `Cancelled`.
    pub async fn run(mut self, cancel: CancellationToken) -> SyncResult<()> {
        info!(name = %self.config.name, "starting list-watch loop");

        loop {
            let event = if cancel.is_cancelled() {
                PhaseEvent::Cancelled
            } else {
                match self.state.phase {
                    SyncPhase::Listing => self.list_phase(&cancel).await,
                    SyncPhase::Watching => self.watch_phase(&cancel).await,
                    SyncPhase::Stopped => PhaseEvent::Cancelled,
                }
            };

            let from = self.state.phase;
            self.state.phase = from.transition(event)?;
            if from == SyncPhase::Watching && self.state.phase == SyncPhase::Listing {
                self.stats.relists += 1;
            }
            self.publish();

            if self.state.phase.is_terminal() {
                info!(name = %self.config.name, "list-watch loop stopped");
                return Err(SyncError::Cancelled);
            }

            if self.state.phase == SyncPhase::Listing && self.backoff(&cancel).await.is_err() {
                self.state.phase = self.state.phase.transition(PhaseEvent::Cancelled)?;
                self.publish();
                info!(name = %self.config.name, "list-watch loop stopped");
                return Err(SyncError::Cancelled);
            }
        }
    }

    /// Runs the loop on a dedicated task.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<SyncResult<()>>
    where
        A: 'static,
        S: 'static,
    {
        tokio::spawn(self.run(cancel))
    }

    async fn list_phase(&mut self, cancel: &CancellationToken) -> PhaseEvent {
        match self.list_and_replace(cancel).await {
            Ok(count) => {
                self.stats.lists_succeeded += 1;
                self.health.record_success();
                info!(
                    name = %self.config.name,
                    items = count,
                    version = %self.state.last_known_version,
                    "list completed"
                );
                PhaseEvent::ListSucceeded
            }
            Err(SyncError::Cancelled) => PhaseEvent::Cancelled,
            Err(err) => {
                self.failures = self.failures.saturating_add(1);
                self.stats.list_failures += 1;
                if err.is_timeout() {
                    self.stats.list_timeouts += 1;
                }
                warn!(
                    name = %self.config.name,
                    error = %err,
                    failures = self.failures,
                    "list failed"
                );
                self.last_error = Some(err.to_string());
                PhaseEvent::ListFailed
            }
        }
    }

    async fn list_and_replace(&mut self, cancel: &CancellationToken) -> SyncResult<usize> {
        let mut request =
            SearchStreamRequest::new().with_resource_version(self.state.last_known_version.clone());
        request.cloud_account_id = self.config.cloud_account_id.clone();

        let result = list::list(&*self.api, request, self.config.list_timeout, cancel).await?;
        let count = result.items.len();

        self.sink.replace(result.items, &result.resource_version)?;
        self.state.last_known_version = result.resource_version;
        if !self.state.has_synced {
            self.sink.mark_synced()?;
            self.state.has_synced = true;
        }
        Ok(count)
    }

    async fn watch_phase(&mut self, cancel: &CancellationToken) -> PhaseEvent {
        let (delivered, result) = self.watch_until_end(cancel).await;
        // A watch that delivered nothing counts as a failed attempt.
        if !matches!(result, Err(SyncError::Cancelled)) {
            if delivered == 0 {
                self.failures = self.failures.saturating_add(1);
            } else {
                self.failures = 0;
            }
        }
        match result {
            Ok(()) => {
                info!(
                    name = %self.config.name,
                    delivered,
                    version = %self.state.last_known_version,
                    "watch closed by server"
                );
                PhaseEvent::WatchEnded
            }
            Err(SyncError::Cancelled) => PhaseEvent::Cancelled,
            Err(err) => {
                self.stats.watch_failures += 1;
                warn!(
                    name = %self.config.name,
                    error = %err,
                    delivered,
                    "watch failed, relisting"
                );
                self.last_error = Some(err.to_string());
                PhaseEvent::WatchEnded
            }
        }
    }

    async fn watch_until_end(&mut self, cancel: &CancellationToken) -> (u64, SyncResult<()>) {
        let mut request = WatchRequest::new(self.state.last_known_version.clone());
        request.cloud_account_id = self.config.cloud_account_id.clone();

        let mut watch =
            match Watch::open(&*self.api, request, self.config.watch_idle_timeout, cancel).await {
                Ok(watch) => watch,
                Err(err) => return (0, Err(err)),
            };
        self.stats.watches_started += 1;
        debug!(
            name = %self.config.name,
            version = %self.state.last_known_version,
            "watch opened"
        );

        let mut delivered = 0;
        loop {
            match watch.next(cancel).await {
                Ok(Some(delta)) => {
                    delivered += 1;
                    self.health.record_success();
                    if let Err(err) = self.apply(delta) {
                        return (delivered, Err(err));
                    }
                    self.publish();
                }
                Ok(None) => return (delivered, Ok(())),
                Err(err) => return (delivered, Err(err)),
            }
        }
    }

    fn apply(&mut self, delta: Delta<R>) -> SyncResult<()> {
        let version = delta.resource_version().clone();
        match delta {
            Delta::Added(object) => {
                debug!(key = %object.key(), version = %version, "added");
                self.sink.add(object)?;
                self.stats.deltas_applied += 1;
            }
            Delta::Updated(object) => {
                debug!(key = %object.key(), version = %version, "updated");
                self.sink.update(object)?;
                self.stats.deltas_applied += 1;
            }
            Delta::Deleted {
                key,
                resource_version,
            } => {
                debug!(key = %key, version = %resource_version, "deleted");
                self.sink.delete(&key, &resource_version)?;
                self.stats.deltas_applied += 1;
            }
            Delta::Bookmark(_) => {
                debug!(version = %version, "bookmark");
                self.stats.bookmarks_seen += 1;
            }
        }
        self.state.last_known_version = version;
        Ok(())
    }

    /// Sleeps before the next attempt after consecutive failures.
    async fn backoff(&self, cancel: &CancellationToken) -> SyncResult<()> {
        let delay = self.config.retry.delay_for_attempt(self.failures);
        if delay.is_zero() {
            return Ok(());
        }
        debug!(name = %self.config.name, delay = ?delay, "backing off");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SyncError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn publish(&self) {
        self.status.send_replace(SyncStatus {
            phase: self.state.phase,
            last_known_version: self.state.last_known_version.clone(),
            has_synced: self.state.has_synced,
            stats: self.stats.clone(),
            last_error: self.last_error.clone(),
        });
    }
}
