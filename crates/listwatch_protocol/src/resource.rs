//! Replicated resources.

use crate::key::{ResourceKey, ResourceVersion};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A resource that can be listed and watched.
///
/// Every snapshot knows its own key and the version at which it was observed.
pub trait Resource: Clone + Send + Sync + 'static {
    /// Returns the cache key of this resource.
    fn key(&self) -> ResourceKey;

    /// Returns the version of this snapshot.
    fn resource_version(&self) -> &ResourceVersion;

    /// Sets the version of this snapshot.
    fn set_resource_version(&mut self, version: ResourceVersion);
}

/// A virtual private cloud.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vpc {
    /// Identity and bookkeeping.
    pub metadata: VpcMetadata,
    /// Desired state.
    pub spec: VpcSpec,
    /// Observed state.
    pub status: VpcStatus,
}

/// VPC metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcMetadata {
    /// Owning cloud account.
    pub cloud_account_id: String,
    /// User-facing name, unique within the account.
    pub name: String,
    /// Server-assigned identifier.
    pub resource_id: String,
    /// Version at which this snapshot was taken.
    pub resource_version: ResourceVersion,
    /// User labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// VPC desired state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcSpec {
    /// IPv4 CIDR block, e.g. `10.0.0.0/16`.
    pub cidr_block: String,
    /// Region the VPC lives in.
    pub region: String,
}

/// VPC observed state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcStatus {
    /// Lifecycle phase.
    pub phase: VpcPhase,
    /// Human-readable detail.
    #[serde(default)]
    pub message: String,
}

/// Lifecycle phase of a VPC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VpcPhase {
    /// Accepted, not yet realized in the backend.
    #[default]
    Provisioning,
    /// Realized and usable.
    Ready,
    /// Backend reported a failure.
    Failed,
    /// Deletion in progress.
    Deleting,
}

impl Vpc {
    /// Creates a VPC with an empty spec.
    pub fn new(cloud_account_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: VpcMetadata {
                cloud_account_id: cloud_account_id.into(),
                name: name.into(),
                ..VpcMetadata::default()
            },
            spec: VpcSpec::default(),
            status: VpcStatus::default(),
        }
    }

    /// Sets the CIDR block.
    pub fn with_cidr_block(mut self, cidr_block: impl Into<String>) -> Self {
        self.spec.cidr_block = cidr_block.into();
        self
    }

    /// Sets the region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.spec.region = region.into();
        self
    }

    /// Sets the resource version.
    pub fn with_resource_version(mut self, version: impl Into<ResourceVersion>) -> Self {
        self.metadata.resource_version = version.into();
        self
    }

    /// Adds a label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }
}

impl Resource for Vpc {
    fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.metadata.cloud_account_id, &self.metadata.name)
    }

    fn resource_version(&self) -> &ResourceVersion {
        &self.metadata.resource_version
    }

    fn set_resource_version(&mut self, version: ResourceVersion) {
        self.metadata.resource_version = version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vpc_key_and_version() {
        let mut vpc = Vpc::new("acct", "vpc1")
            .with_cidr_block("10.0.0.0/16")
            .with_resource_version("11");

        assert_eq!(vpc.key(), ResourceKey::new("acct", "vpc1"));
        assert_eq!(vpc.resource_version().as_str(), "11");

        vpc.set_resource_version(ResourceVersion::new("12"));
        assert_eq!(vpc.metadata.resource_version.as_str(), "12");
        assert_eq!(vpc.spec.cidr_block, "10.0.0.0/16");
        assert_eq!(vpc.status.phase, VpcPhase::Provisioning);
    }
}
