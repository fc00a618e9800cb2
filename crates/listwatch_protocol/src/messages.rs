//! Stream messages for the list-watch API.

use crate::error::{ProtocolError, ProtocolResult};
use crate::key::{ResourceKey, ResourceVersion};
use crate::resource::Resource;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Type of a stream delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum WatchDeltaType {
    /// Resource was created.
    Added,
    /// Resource was modified.
    Updated,
    /// Resource was removed.
    Deleted,
    /// Consistent checkpoint carrying only a version.
    Bookmark,
}

impl WatchDeltaType {
    /// Converts to a numeric code for CBOR encoding.
    pub fn to_code(&self) -> u8 {
        match self {
            WatchDeltaType::Added => 1,
            WatchDeltaType::Updated => 2,
            WatchDeltaType::Deleted => 3,
            WatchDeltaType::Bookmark => 4,
        }
    }

    /// Converts from a numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(WatchDeltaType::Added),
            2 => Some(WatchDeltaType::Updated),
            3 => Some(WatchDeltaType::Deleted),
            4 => Some(WatchDeltaType::Bookmark),
            _ => None,
        }
    }
}

impl From<WatchDeltaType> for u8 {
    fn from(delta_type: WatchDeltaType) -> Self {
        delta_type.to_code()
    }
}

impl TryFrom<u8> for WatchDeltaType {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        WatchDeltaType::from_code(code).ok_or(ProtocolError::UnknownDeltaType(code))
    }
}

/// One delta on a `SearchStream` or `Watch` stream.
///
/// Wire shape: `{delta_type, key?, resource_version, object?}`. The key is
/// absent on bookmarks; the object is absent on bookmarks and deletions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchResponse<R> {
    /// Kind of delta.
    pub delta_type: WatchDeltaType,
    /// Key of the affected resource.
    #[serde(default)]
    pub key: Option<ResourceKey>,
    /// Version at which the delta happened.
    pub resource_version: ResourceVersion,
    /// Resource snapshot after the delta.
    pub object: Option<R>,
}

impl<R: Resource> WatchResponse<R> {
    /// Creates an `Added` delta for a snapshot.
    pub fn added(object: R) -> Self {
        Self::with_object(WatchDeltaType::Added, object)
    }

    /// Creates an `Updated` delta for a snapshot.
    pub fn updated(object: R) -> Self {
        Self::with_object(WatchDeltaType::Updated, object)
    }

    /// Creates a `Deleted` delta.
    pub fn deleted(key: ResourceKey, resource_version: ResourceVersion) -> Self {
        Self {
            delta_type: WatchDeltaType::Deleted,
            key: Some(key),
            resource_version,
            object: None,
        }
    }

    fn with_object(delta_type: WatchDeltaType, object: R) -> Self {
        Self {
            delta_type,
            key: Some(object.key()),
            resource_version: object.resource_version().clone(),
            object: Some(object),
        }
    }
}

impl<R> WatchResponse<R> {
    /// Creates a `Bookmark` delta.
    pub fn bookmark(resource_version: ResourceVersion) -> Self {
        Self {
            delta_type: WatchDeltaType::Bookmark,
            key: None,
            resource_version,
            object: None,
        }
    }

    /// Returns true if this is a bookmark.
    pub fn is_bookmark(&self) -> bool {
        self.delta_type == WatchDeltaType::Bookmark
    }
}

impl<R: Serialize> WatchResponse<R> {
    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        to_cbor(self)
    }
}

impl<R: DeserializeOwned> WatchResponse<R> {
    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        from_cbor(bytes)
    }
}

/// Request opening a `SearchStream` ("List") call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStreamRequest {
    /// Last version the client knew about. A hint only; the server always
    /// answers with a complete snapshot.
    #[serde(default)]
    pub resource_version: ResourceVersion,
    /// Restricts the snapshot to one cloud account.
    #[serde(default)]
    pub cloud_account_id: Option<String>,
}

impl SearchStreamRequest {
    /// Creates an unfiltered request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the version hint.
    pub fn with_resource_version(mut self, version: ResourceVersion) -> Self {
        self.resource_version = version;
        self
    }

    /// Restricts the request to one cloud account.
    pub fn with_cloud_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.cloud_account_id = Some(account_id.into());
        self
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        from_cbor(bytes)
    }
}

/// Request opening a `Watch` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchRequest {
    /// Deltas strictly after this version are streamed.
    pub resource_version: ResourceVersion,
    /// Restricts the stream to one cloud account.
    #[serde(default)]
    pub cloud_account_id: Option<String>,
}

impl WatchRequest {
    /// Creates a request starting after `resource_version`.
    pub fn new(resource_version: ResourceVersion) -> Self {
        Self {
            resource_version,
            cloud_account_id: None,
        }
    }

    /// Restricts the request to one cloud account.
    pub fn with_cloud_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.cloud_account_id = Some(account_id.into());
        self
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        from_cbor(bytes)
    }
}

fn to_cbor<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)?;
    Ok(bytes)
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    Ok(ciborium::from_reader(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Vpc;

    #[test]
    fn delta_type_codes() {
        for delta_type in [
            WatchDeltaType::Added,
            WatchDeltaType::Updated,
            WatchDeltaType::Deleted,
            WatchDeltaType::Bookmark,
        ] {
            assert_eq!(WatchDeltaType::from_code(delta_type.to_code()), Some(delta_type));
        }
        assert_eq!(WatchDeltaType::from_code(0), None);
        assert!(WatchDeltaType::try_from(5).is_err());
    }

    #[test]
    fn bookmark_has_no_key_or_object() {
        let bookmark: WatchResponse<Vpc> = WatchResponse::bookmark(ResourceVersion::new("11"));
        assert!(bookmark.is_bookmark());
        assert!(bookmark.key.is_none());
        assert!(bookmark.object.is_none());
    }

    #[test]
    fn added_carries_key_and_version_of_object() {
        let vpc = Vpc::new("acct", "vpc1").with_resource_version("12");
        let delta = WatchResponse::added(vpc);
        assert_eq!(delta.key, Some(ResourceKey::new("acct", "vpc1")));
        assert_eq!(delta.resource_version.as_str(), "12");
    }

    #[test]
    fn watch_response_cbor() {
        let vpc = Vpc::new("acct", "vpc1")
            .with_cidr_block("10.0.0.0/16")
            .with_resource_version("12");
        let delta = WatchResponse::updated(vpc);

        let bytes = delta.encode().unwrap();
        let decoded: WatchResponse<Vpc> = WatchResponse::decode(&bytes).unwrap();
        assert_eq!(decoded, delta);
    }

    #[test]
    fn unknown_delta_type_is_rejected() {
        #[derive(Serialize)]
        struct RawDelta {
            delta_type: u8,
            resource_version: String,
        }

        let mut bytes = Vec::new();
        ciborium::into_writer(
            &RawDelta {
                delta_type: 9,
                resource_version: "1".into(),
            },
            &mut bytes,
        )
        .unwrap();

        let result: ProtocolResult<WatchResponse<Vpc>> = WatchResponse::decode(&bytes);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn request_builders() {
        let request = SearchStreamRequest::new()
            .with_resource_version(ResourceVersion::new("11"))
            .with_cloud_account_id("acct");
        assert_eq!(request.resource_version.as_str(), "11");
        assert_eq!(request.cloud_account_id.as_deref(), Some("acct"));

        let bytes = request.encode().unwrap();
        assert_eq!(SearchStreamRequest::decode(&bytes).unwrap(), request);

        let watch = WatchRequest::new(ResourceVersion::new("11"));
        assert!(watch.cloud_account_id.is_none());
    }
}
