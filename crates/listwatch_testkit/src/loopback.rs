//! Loopback adapter between the engine and the in-memory server.

use async_trait::async_trait;
use futures::StreamExt;
use listwatch_engine::{DeltaStream, ResourceApi, SyncError, SyncResult};
use listwatch_protocol::{Resource, SearchStreamRequest, WatchRequest};
use listwatch_server::{ResourceServer, ServerError};
use std::sync::Arc;

/// Serves the engine's [`ResourceApi`] from an in-process
/// [`ResourceServer`].
pub struct LoopbackApi<R> {
    server: Arc<ResourceServer<R>>,
}

impl<R: Resource> LoopbackApi<R> {
    /// Creates an adapter over `server`.
    pub fn new(server: Arc<ResourceServer<R>>) -> Self {
        Self { server }
    }

    /// Returns the underlying server.
    pub fn server(&self) -> &Arc<ResourceServer<R>> {
        &self.server
    }
}

/// Maps a server error onto the engine's taxonomy.
///
/// Refused calls are `RemoteUnavailable`; anything else, including errors
/// on an open stream, is `RemoteFault`.
pub fn to_sync_error(err: ServerError) -> SyncError {
    match err {
        ServerError::Unavailable(message) => SyncError::RemoteUnavailable(message),
        other => SyncError::RemoteFault(other.to_string()),
    }
}

#[async_trait]
impl<R: Resource> ResourceApi<R> for LoopbackApi<R> {
    async fn search_stream(&self, request: SearchStreamRequest) -> SyncResult<DeltaStream<R>> {
        let stream = self
            .server
            .handle_search_stream(request)
            .map_err(to_sync_error)?;
        Ok(stream.map(|item| item.map_err(to_sync_error)).boxed())
    }

    async fn watch(&self, request: WatchRequest) -> SyncResult<DeltaStream<R>> {
        let stream = self.server.handle_watch(request).map_err(to_sync_error)?;
        Ok(stream.map(|item| item.map_err(to_sync_error)).boxed())
    }
}
