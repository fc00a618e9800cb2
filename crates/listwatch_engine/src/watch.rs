//! Watch phase: stream deltas after a known version.

use crate::decoder::{self, Delta};
use crate::error::{SyncError, SyncResult};
use crate::transport::{DeltaStream, ResourceApi};
use futures::StreamExt;
use listwatch_protocol::{Resource, WatchRequest, WatchResponse};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// An open Watch stream.
///
/// Dropping the watch drops the underlying stream, which terminates the
/// remote call.
pub struct Watch<R> {
    stream: DeltaStream<R>,
    idle_timeout: Option<Duration>,
}

impl<R: Resource> Watch<R> {
    /// Opens a Watch call.
    pub async fn open<A>(
        api: &A,
        request: WatchRequest,
        idle_timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> SyncResult<Self>
    where
        A: ResourceApi<R> + ?Sized,
    {
        let stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            stream = api.watch(request) => stream?,
        };
        Ok(Self {
            stream,
            idle_timeout,
        })
    }

    /// Waits for the next delta.
    ///
    /// Returns `Ok(None)` when the server closes the stream cleanly.
    pub async fn next(&mut self, cancel: &CancellationToken) -> SyncResult<Option<Delta<R>>> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            response = next_within(&mut self.stream, self.idle_timeout) => response?,
        };

        match response {
            Some(response) => decoder::decode(response?).map(Some),
            None => Ok(None),
        }
    }
}

async fn next_within<R>(
    stream: &mut DeltaStream<R>,
    idle_timeout: Option<Duration>,
) -> SyncResult<Option<SyncResult<WatchResponse<R>>>> {
    match idle_timeout {
        Some(idle) => tokio::time::timeout(idle, stream.next())
            .await
            .map_err(|_| SyncError::WatchIdle(idle)),
        None => Ok(stream.next().await),
    }
}
