//! List phase: fetch a complete snapshot.

use crate::decoder::{self, Delta};
use crate::error::{SyncError, SyncResult};
use crate::transport::ResourceApi;
use futures::StreamExt;
use listwatch_protocol::{Resource, ResourceKey, ResourceVersion, SearchStreamRequest};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A complete snapshot returned by a List call.
#[derive(Debug, Clone, PartialEq)]
pub struct ListResult<R> {
    /// Every object in the snapshot, ordered by key.
    pub items: Vec<R>,
    /// Version of the terminating bookmark.
    pub resource_version: ResourceVersion,
}

/// Performs one List call.
///
/// Accumulates `Added`/`Updated` objects until the bookmark arrives. The
/// whole call, including opening the stream, is bounded by `timeout`. A
/// stream that closes before the bookmark fails with `RemoteFault`.
pub async fn list<R, A>(
    api: &A,
    request: SearchStreamRequest,
    timeout: Duration,
    cancel: &CancellationToken,
) -> SyncResult<ListResult<R>>
where
    R: Resource,
    A: ResourceApi<R> + ?Sized,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        result = tokio::time::timeout(timeout, collect(api, request)) => {
            result.map_err(|_| SyncError::Timeout(timeout))?
        }
    }
}

async fn collect<R, A>(api: &A, request: SearchStreamRequest) -> SyncResult<ListResult<R>>
where
    R: Resource,
    A: ResourceApi<R> + ?Sized,
{
    let mut stream = api.search_stream(request).await?;
    let mut items: BTreeMap<ResourceKey, R> = BTreeMap::new();

    while let Some(response) = stream.next().await {
        match decoder::decode(response?)? {
            Delta::Added(object) | Delta::Updated(object) => {
                items.insert(object.key(), object);
            }
            Delta::Deleted { key, .. } => {
                items.remove(&key);
            }
            Delta::Bookmark(resource_version) => {
                return Ok(ListResult {
                    items: items.into_values().collect(),
                    resource_version,
                });
            }
        }
    }

    Err(SyncError::RemoteFault(
        "list stream closed before bookmark".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockResourceApi, ScriptedStream};
    use listwatch_protocol::{Vpc, WatchResponse};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn vpc(name: &str, version: &str) -> Vpc {
        Vpc::new("acct", name).with_resource_version(version)
    }

    #[tokio::test]
    async fn collects_until_bookmark() {
        let api = MockResourceApi::new();
        api.push_list(
            ScriptedStream::new()
                .send(WatchResponse::added(vpc("vpc2", "8")))
                .send(WatchResponse::added(vpc("vpc1", "9")))
                .send(WatchResponse::bookmark(ResourceVersion::new("11")))
                .send(WatchResponse::added(vpc("vpc3", "12"))),
        );

        let result = list(&api, SearchStreamRequest::new(), TIMEOUT, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.resource_version.as_str(), "11");
        let names: Vec<_> = result.items.iter().map(|v| v.metadata.name.as_str()).collect();
        assert_eq!(names, vec!["vpc1", "vpc2"]);
    }

    #[tokio::test]
    async fn empty_snapshot() {
        let api: MockResourceApi<Vpc> = MockResourceApi::new();
        api.push_list(ScriptedStream::new().send(WatchResponse::bookmark(ResourceVersion::new("11"))));

        let result = list(&api, SearchStreamRequest::new(), TIMEOUT, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.items.is_empty());
        assert_eq!(result.resource_version.as_str(), "11");
    }

    #[tokio::test]
    async fn later_snapshot_entries_win() {
        let api = MockResourceApi::new();
        api.push_list(
            ScriptedStream::new()
                .send(WatchResponse::added(vpc("vpc1", "8")))
                .send(WatchResponse::updated(vpc("vpc1", "9")))
                .send(WatchResponse::added(vpc("vpc2", "10")))
                .send(WatchResponse::deleted(
                    ResourceKey::new("acct", "vpc2"),
                    ResourceVersion::new("11"),
                ))
                .send(WatchResponse::bookmark(ResourceVersion::new("11"))),
        );

        let result = list(&api, SearchStreamRequest::new(), TIMEOUT, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.items, vec![vpc("vpc1", "9")]);
    }

    #[tokio::test]
    async fn close_before_bookmark_is_fault() {
        let api = MockResourceApi::new();
        api.push_list(ScriptedStream::new().send(WatchResponse::added(vpc("vpc1", "8"))));

        let result = list(&api, SearchStreamRequest::new(), TIMEOUT, &CancellationToken::new()).await;
        assert!(matches!(result, Err(SyncError::RemoteFault(_))));
    }

    #[tokio::test]
    async fn stream_error_is_propagated() {
        let api: MockResourceApi<Vpc> = MockResourceApi::new();
        api.push_list(ScriptedStream::new().fail(SyncError::RemoteFault("injected".into())));

        let result = list(&api, SearchStreamRequest::new(), TIMEOUT, &CancellationToken::new()).await;
        assert_eq!(result, Err(SyncError::RemoteFault("injected".into())));
    }

    #[tokio::test]
    async fn hanging_list_times_out() {
        let api = MockResourceApi::new();
        api.push_list(
            ScriptedStream::new()
                .send(WatchResponse::added(vpc("vpc1", "8")))
                .hang(),
        );

        let timeout = Duration::from_millis(50);
        let result = list(&api, SearchStreamRequest::new(), timeout, &CancellationToken::new()).await;
        assert_eq!(result, Err(SyncError::Timeout(timeout)));
    }

    #[tokio::test]
    async fn cancellation_interrupts_list() {
        let api: MockResourceApi<Vpc> = MockResourceApi::new();
        api.push_list(ScriptedStream::hanging());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = list(&api, SearchStreamRequest::new(), TIMEOUT, &cancel).await;
        assert_eq!(result, Err(SyncError::Cancelled));
    }

    #[tokio::test]
    async fn unavailable_api_fails_to_open() {
        let api: MockResourceApi<Vpc> = MockResourceApi::new();
        api.set_available(false);

        let result = list(&api, SearchStreamRequest::new(), TIMEOUT, &CancellationToken::new()).await;
        assert!(matches!(result, Err(SyncError::RemoteUnavailable(_))));
    }
}
