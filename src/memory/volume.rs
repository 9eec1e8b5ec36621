//! In-process volume manager

use super::lock_unpoisoned;
use crate::error::{GantryError, GantryResult};
use crate::orchestration::{Volume, VolumeManager};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Root under which volume paths are reported
const VOLUME_ROOT: &str = "/var/lib/gantry/volumes";

/// A volume living in memory
pub struct MemoryVolume {
    handle: String,
    worker: String,
    path: String,
    initialized: AtomicBool,
}

impl MemoryVolume {
    fn new(worker: &str) -> Self {
        let handle = Uuid::new_v4().to_string();
        Self {
            path: format!("{}/{}", VOLUME_ROOT, handle),
            handle,
            worker: worker.to_string(),
            initialized: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Volume for MemoryVolume {
    fn handle(&self) -> &str {
        &self.handle
    }

    fn worker_name(&self) -> &str {
        &self.worker
    }

    fn path(&self) -> &str {
        &self.path
    }

    async fn is_initialized(&self) -> GantryResult<bool> {
        Ok(self.initialized.load(Ordering::SeqCst))
    }

    async fn mark_initialized(&self) -> GantryResult<()> {
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Volume manager keyed by (worker, cache key)
#[derive(Default)]
pub struct MemoryVolumeManager {
    volumes: Mutex<HashMap<(String, String), Arc<MemoryVolume>>>,
    created: AtomicUsize,
    lookup_failure: Mutex<Option<String>>,
}

impl MemoryVolumeManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn volume(&self, worker: &str, key: &str) -> Option<Arc<MemoryVolume>> {
        lock_unpoisoned(&self.volumes)
            .get(&(worker.to_string(), key.to_string()))
            .cloned()
    }

    /// Number of volumes allocated so far
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Make subsequent lookups fail
    pub fn fail_lookups(&self, reason: impl Into<String>) {
        *lock_unpoisoned(&self.lookup_failure) = Some(reason.into());
    }
}

#[async_trait]
impl VolumeManager for MemoryVolumeManager {
    async fn find_volume_for_cache_key(
        &self,
        worker: &str,
        key: &str,
    ) -> GantryResult<Option<Arc<dyn Volume>>> {
        if let Some(reason) = lock_unpoisoned(&self.lookup_failure).clone() {
            return Err(GantryError::remote("find volume", reason));
        }

        Ok(self
            .volume(worker, key)
            .map(|volume| volume as Arc<dyn Volume>))
    }

    async fn create_volume(&self, worker: &str, key: &str) -> GantryResult<Arc<dyn Volume>> {
        let volume = Arc::new(MemoryVolume::new(worker));
        lock_unpoisoned(&self.volumes).insert((worker.to_string(), key.to_string()), volume.clone());
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(volume)
    }
}
