//! Delta decoding.
//!
//! Turns a wire `WatchResponse` into a typed `Delta`, enforcing the wire
//! contract: mutations carry an object whose key matches the delta's key,
//! deletions carry a key, and every delta carries a version.

use crate::error::{SyncError, SyncResult};
use listwatch_protocol::{Resource, ResourceKey, ResourceVersion, WatchDeltaType, WatchResponse};

/// A decoded stream delta.
#[derive(Debug, Clone, PartialEq)]
pub enum Delta<R> {
    /// Resource was created.
    Added(R),
    /// Resource was modified.
    Updated(R),
    /// Resource was removed.
    Deleted {
        /// Key of the removed resource.
        key: ResourceKey,
        /// Version of the removal.
        resource_version: ResourceVersion,
    },
    /// Checkpoint; carries no cache mutation.
    Bookmark(ResourceVersion),
}

impl<R: Resource> Delta<R> {
    /// Returns the version this delta advances to.
    pub fn resource_version(&self) -> &ResourceVersion {
        match self {
            Delta::Added(object) | Delta::Updated(object) => object.resource_version(),
            Delta::Deleted {
                resource_version, ..
            } => resource_version,
            Delta::Bookmark(version) => version,
        }
    }

    /// Returns the affected key, or `None` for bookmarks.
    pub fn key(&self) -> Option<ResourceKey> {
        match self {
            Delta::Added(object) | Delta::Updated(object) => Some(object.key()),
            Delta::Deleted { key, .. } => Some(key.clone()),
            Delta::Bookmark(_) => None,
        }
    }

    /// Returns true if this is a bookmark.
    pub fn is_bookmark(&self) -> bool {
        matches!(self, Delta::Bookmark(_))
    }
}

/// Decodes one wire delta.
pub fn decode<R: Resource>(response: WatchResponse<R>) -> SyncResult<Delta<R>> {
    let WatchResponse {
        delta_type,
        key,
        resource_version,
        object,
    } = response;

    match delta_type {
        WatchDeltaType::Bookmark => {
            if resource_version.is_empty() {
                return Err(SyncError::Protocol("bookmark without version".into()));
            }
            Ok(Delta::Bookmark(resource_version))
        }
        WatchDeltaType::Added | WatchDeltaType::Updated => {
            let mut object = object.ok_or_else(|| {
                SyncError::Protocol(format!("{delta_type:?} delta without object"))
            })?;
            if let Some(key) = key {
                let object_key = object.key();
                if key != object_key {
                    return Err(SyncError::Protocol(format!(
                        "delta key {key} does not match object key {object_key}"
                    )));
                }
            }
            if object.resource_version().is_empty() {
                if resource_version.is_empty() {
                    return Err(SyncError::Protocol(format!(
                        "{delta_type:?} delta for {} without version",
                        object.key()
                    )));
                }
                object.set_resource_version(resource_version);
            }
            Ok(if delta_type == WatchDeltaType::Added {
                Delta::Added(object)
            } else {
                Delta::Updated(object)
            })
        }
        WatchDeltaType::Deleted => {
            let key = key
                .or_else(|| object.as_ref().map(Resource::key))
                .ok_or_else(|| SyncError::Protocol("Deleted delta without key".into()))?;
            if resource_version.is_empty() {
                return Err(SyncError::Protocol(format!(
                    "Deleted delta for {key} without version"
                )));
            }
            Ok(Delta::Deleted {
                key,
                resource_version,
            })
        }
    }
}
