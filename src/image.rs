//! Container image boundary
//!
//! An image is either a static path already present on the worker or an
//! artifact delivered by a resource. Only the latter goes through the fetch
//! engine; the fetched volume's `rootfs` directory becomes the image.

use crate::cancel::Cancellation;
use crate::error::GantryResult;
use crate::fetch::{Fetcher, VolumeRef};
use crate::orchestration::{ContainerSpec, WorkerPool};
use crate::resource::{ResourceInstance, Version};
use tracing::debug;

/// Where a container's root filesystem comes from
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    /// Path on the worker, used as is
    Path(String),
    /// Artifact fetched through a resource
    Resource(ResourceInstance),
}

/// A root filesystem ready to hand to the container runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub rootfs: String,
    /// Version of the resource the image was fetched from
    pub version: Option<Version>,
    pub volume: Option<VolumeRef>,
}

impl ResolvedImage {
    /// Image URL in the form the container runtime accepts
    pub fn url(&self) -> String {
        format!("raw://{}", self.rootfs)
    }
}

/// Resolve `image`, fetching it when a resource delivers it
pub async fn resolve_image(
    fetcher: &Fetcher,
    cancel: &Cancellation,
    pool: &dyn WorkerPool,
    image: &ImageSource,
    spec: &ContainerSpec,
) -> GantryResult<ResolvedImage> {
    match image {
        ImageSource::Path(path) => Ok(ResolvedImage {
            rootfs: path.clone(),
            version: None,
            volume: None,
        }),
        ImageSource::Resource(instance) => {
            let fetched = fetcher.fetch(cancel, instance, pool, spec).await?;
            let rootfs = format!("{}/rootfs", fetched.volume.path.trim_end_matches('/'));
            debug!("Resolved {} image to {}", instance.resource_type(), rootfs);

            Ok(ResolvedImage {
                rootfs,
                version: Some(fetched.version),
                volume: Some(fetched.volume),
            })
        }
    }
}
