//! Worker volume abstraction

use crate::error::GantryResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Volume manager spanning the cluster's workers
#[async_trait]
pub trait VolumeManager: Send + Sync {
    /// The volume holding `key` on `worker`, initialized or not
    async fn find_volume_for_cache_key(
        &self,
        worker: &str,
        key: &str,
    ) -> GantryResult<Option<Arc<dyn Volume>>>;

    /// Allocate an empty, uninitialized volume for `key` on `worker`
    async fn create_volume(&self, worker: &str, key: &str) -> GantryResult<Arc<dyn Volume>>;
}

/// Handle to a content-bearing volume on one worker
#[async_trait]
pub trait Volume: Send + Sync {
    fn handle(&self) -> &str;

    fn worker_name(&self) -> &str;

    /// Path of the volume on the worker's filesystem
    fn path(&self) -> &str;

    async fn is_initialized(&self) -> GantryResult<bool>;

    async fn mark_initialized(&self) -> GantryResult<()>;
}
