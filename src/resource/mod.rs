//! Resource instances
//!
//! A resource instance names one versioned external artifact: its type,
//! the version to fetch, the source configuration, and get params.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Version of a resource, as reported by its check script
pub type Version = BTreeMap<String, String>;

/// Source configuration of a resource
pub type Source = BTreeMap<String, Value>;

/// Params passed to a get or put
pub type Params = BTreeMap<String, Value>;

/// A single metadata entry emitted by a resource script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataField {
    pub name: String,
    pub value: String,
}

impl MetadataField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Resource type name (e.g. "git", "registry-image")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceType(String);

impl ResourceType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Who a resource container belongs to
///
/// Containers are found or created per owner, so a retried step lands in
/// the container its previous attempt left behind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerOwner {
    /// A step of a running build
    BuildStep {
        build_id: u64,
        plan_id: String,
        team_id: u64,
    },
    /// An image fetch on behalf of another container
    Image { parent: String },
}

impl ContainerOwner {
    pub fn build_step(build_id: u64, plan_id: impl Into<String>, team_id: u64) -> Self {
        Self::BuildStep {
            build_id,
            plan_id: plan_id.into(),
            team_id,
        }
    }
}

impl fmt::Display for ContainerOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuildStep {
                build_id, plan_id, ..
            } => write!(f, "build-{}-{}", build_id, plan_id),
            Self::Image { parent } => write!(f, "image-for-{}", parent),
        }
    }
}

/// What to fetch, and for whom
///
/// Immutable once constructed. Equality of the cache identity depends only
/// on type, version, source and params, never on the owner.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceInstance {
    resource_type: ResourceType,
    version: Version,
    source: Source,
    params: Params,
    container_owner: ContainerOwner,
}

impl ResourceInstance {
    pub fn new(
        resource_type: impl Into<ResourceType>,
        version: Version,
        source: Source,
        params: Params,
        container_owner: ContainerOwner,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            version,
            source,
            params,
            container_owner,
        }
    }

    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn container_owner(&self) -> &ContainerOwner {
        &self.container_owner
    }

    /// Content key of the artifact this instance materializes
    pub fn cache_key(&self) -> String {
        crate::cache::cache_key(self)
    }

    /// Lock guarding creation of this instance's cache on `worker_name`
    pub fn lock_name(&self, worker_name: &str, scope: crate::cache::CacheScope) -> String {
        crate::cache::lock_name(self, worker_name, scope)
    }
}

impl From<String> for ResourceType {
    fn from(s: String) -> Self {
        Self(s)
    }
}
