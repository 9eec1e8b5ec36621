//! Fetch-or-reuse of resource caches
//!
//! [`Fetcher`] is the entry point. It wraps a [`FetchSource`] in a lock
//! retry loop so that at most one Create runs per cache key at a time,
//! while cache hits never touch the lock service.

mod coordinator;
mod source;

pub use coordinator::Fetcher;
pub use source::FetchSource;

use crate::orchestration::Volume;
use crate::resource::{MetadataField, Version};

/// Reference to the volume holding a fetched artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeRef {
    pub handle: String,
    pub worker_name: String,
    pub path: String,
}

impl VolumeRef {
    pub fn from_volume(volume: &dyn Volume) -> Self {
        Self {
            handle: volume.handle().to_string(),
            worker_name: volume.worker_name().to_string(),
            path: volume.path().to_string(),
        }
    }
}

/// A materialized artifact
///
/// Every caller that fetches the same instance on the same worker gets an
/// equal value, whether it ran the Create or hit the cache afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedSource {
    pub version: Version,
    pub metadata: Vec<MetadataField>,
    pub volume: VolumeRef,
}

impl VersionedSource {
    pub fn new(version: Version, metadata: Vec<MetadataField>, volume: VolumeRef) -> Self {
        Self {
            version,
            metadata,
            volume,
        }
    }
}
