//! Remote resource API abstraction.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use listwatch_protocol::{SearchStreamRequest, WatchRequest, WatchResponse};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// A server-streamed sequence of wire deltas.
///
/// Dropping the stream must terminate the underlying call.
pub type DeltaStream<R> = BoxStream<'static, SyncResult<WatchResponse<R>>>;

/// The remote resource API.
///
/// Implement this trait over the actual RPC client. Errors opening a call
/// should be `RemoteUnavailable`; errors on an open stream `RemoteFault`.
#[async_trait]
pub trait ResourceApi<R>: Send + Sync {
    /// Opens a `SearchStream` call: a full snapshot terminated by a bookmark.
    async fn search_stream(&self, request: SearchStreamRequest) -> SyncResult<DeltaStream<R>>;

    /// Opens a `Watch` call: deltas after `request.resource_version`.
    async fn watch(&self, request: WatchRequest) -> SyncResult<DeltaStream<R>>;
}

/// One scripted server stream for `MockResourceApi`.
///
/// Yields its items in order, then either ends or, if `hang` was set,
/// stays open forever without sending anything.
pub struct ScriptedStream<R> {
    items: Vec<SyncResult<WatchResponse<R>>>,
    hang: bool,
}

impl<R: Send + 'static> ScriptedStream<R> {
    /// Creates an empty stream that ends immediately.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            hang: false,
        }
    }

    /// Creates a stream that never sends anything and never ends.
    pub fn hanging() -> Self {
        Self::new().hang()
    }

    /// Appends a delta.
    pub fn send(mut self, response: WatchResponse<R>) -> Self {
        self.items.push(Ok(response));
        self
    }

    /// Appends a stream error.
    pub fn fail(mut self, error: SyncError) -> Self {
        self.items.push(Err(error));
        self
    }

    /// Keeps the stream open after the scripted items.
    pub fn hang(mut self) -> Self {
        self.hang = true;
        self
    }

    fn into_stream(self) -> DeltaStream<R> {
        let items = stream::iter(self.items);
        if self.hang {
            items.chain(stream::pending()).boxed()
        } else {
            items.boxed()
        }
    }
}

impl<R: Send + 'static> Default for ScriptedStream<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// A mock API for testing.
///
/// Each call pops the next scripted stream for its kind; once the script is
/// exhausted, calls return a hanging stream.
pub struct MockResourceApi<R> {
    available: AtomicBool,
    lists: Mutex<VecDeque<ScriptedStream<R>>>,
    watches: Mutex<VecDeque<ScriptedStream<R>>>,
    list_requests: Mutex<Vec<SearchStreamRequest>>,
    watch_requests: Mutex<Vec<WatchRequest>>,
    list_calls: AtomicUsize,
    watch_calls: AtomicUsize,
}

impl<R: Send + 'static> MockResourceApi<R> {
    /// Creates a new mock API with empty scripts.
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            lists: Mutex::new(VecDeque::new()),
            watches: Mutex::new(VecDeque::new()),
            list_requests: Mutex::new(Vec::new()),
            watch_requests: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            watch_calls: AtomicUsize::new(0),
        }
    }

    /// Queues the stream for the next List call.
    pub fn push_list(&self, stream: ScriptedStream<R>) {
        self.lists.lock().push_back(stream);
    }

    /// Queues the stream for the next Watch call.
    pub fn push_watch(&self, stream: ScriptedStream<R>) {
        self.watches.lock().push_back(stream);
    }

    /// Makes new calls fail with `RemoteUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Returns the number of List calls made.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Returns the number of Watch calls made.
    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    /// Returns all List requests received.
    pub fn list_requests(&self) -> Vec<SearchStreamRequest> {
        self.list_requests.lock().clone()
    }

    /// Returns all Watch requests received.
    pub fn watch_requests(&self) -> Vec<WatchRequest> {
        self.watch_requests.lock().clone()
    }

    fn check_available(&self) -> SyncResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::RemoteUnavailable("mock api unavailable".into()))
        }
    }
}

impl<R: Send + 'static> Default for MockResourceApi<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Send + 'static> ResourceApi<R> for MockResourceApi<R> {
    async fn search_stream(&self, request: SearchStreamRequest) -> SyncResult<DeltaStream<R>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.list_requests.lock().push(request);
        self.check_available()?;
        let script = self.lists.lock().pop_front();
        Ok(script.unwrap_or_else(ScriptedStream::hanging).into_stream())
    }

    async fn watch(&self, request: WatchRequest) -> SyncResult<DeltaStream<R>> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        self.watch_requests.lock().push(request);
        self.check_available()?;
        let script = self.watches.lock().pop_front();
        Ok(script.unwrap_or_else(ScriptedStream::hanging).into_stream())
    }
}
