//! One fetch attempt against one chosen worker

use crate::cache::{slot_state, CacheState, MetadataStore, VolumeCache};
use crate::cancel::Cancellation;
use crate::config::schema::ContainerConfig;
use crate::error::{GantryError, GantryResult};
use crate::fetch::{VersionedSource, VolumeRef};
use crate::orchestration::{BindMount, ContainerSpec, Volume, VolumeManager, VolumeMount, Worker};
use crate::resource::ResourceInstance;
use crate::script::ScriptRunner;
use std::sync::Arc;
use tracing::{debug, info};

/// A resource instance paired with the worker that should hold it
pub struct FetchSource<'a> {
    instance: &'a ResourceInstance,
    worker: Worker,
    container_spec: &'a ContainerSpec,
    container_config: &'a ContainerConfig,
    volumes: &'a dyn VolumeManager,
    metadata: &'a dyn MetadataStore,
    runner: &'a ScriptRunner,
    cache_key: String,
}

impl<'a> FetchSource<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instance: &'a ResourceInstance,
        worker: Worker,
        container_spec: &'a ContainerSpec,
        container_config: &'a ContainerConfig,
        volumes: &'a dyn VolumeManager,
        metadata: &'a dyn MetadataStore,
        runner: &'a ScriptRunner,
    ) -> Self {
        Self {
            cache_key: instance.cache_key(),
            instance,
            worker,
            container_spec,
            container_config,
            volumes,
            metadata,
            runner,
        }
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    /// Look up an initialized cache for this instance on the worker
    ///
    /// Read-only; safe to call concurrently from any number of callers.
    pub async fn find(&self) -> GantryResult<Option<VersionedSource>> {
        let Some(cache) = self.lookup().await? else {
            return Ok(None);
        };

        let state = slot_state(Some(&cache))
            .await
            .map_err(|e| self.lookup_error(e))?;
        if state != CacheState::Complete {
            debug!("Cache {} on {} is {}", self.cache_key, self.worker.name(), state);
            return Ok(None);
        }

        let metadata = self
            .metadata
            .read_metadata(&self.cache_key)
            .await
            .map_err(|e| self.lookup_error(e))?
            .unwrap_or_default();

        Ok(Some(VersionedSource::new(
            self.instance.version().clone(),
            metadata,
            VolumeRef::from_volume(cache.volume().as_ref()),
        )))
    }

    /// Materialize the cache
    ///
    /// Must only be called while holding the lock for this cache key. A
    /// failure leaves the volume uninitialized so a later attempt starts over.
    pub async fn create(&self, cancel: &Cancellation) -> GantryResult<VersionedSource> {
        if let Some(found) = self.find().await? {
            info!(
                "Cache {} was populated on {} before the lock was acquired",
                self.cache_key,
                self.worker.name()
            );
            return Ok(found);
        }

        if cancel.is_cancelled() {
            return Err(GantryError::Cancelled);
        }

        let cache = self.volume_for_create().await?;
        let spec = self.container_spec_for(cache.volume().as_ref());

        let container = self
            .worker
            .containers()
            .find_or_create_container(self.instance.container_owner(), &spec)
            .await
            .map_err(|e| GantryError::ContainerCreate {
                worker: self.worker.name().to_string(),
                source: Box::new(e),
            })?;

        let result = self
            .runner
            .get(
                cancel,
                container.as_ref(),
                self.instance.source(),
                self.instance.params(),
                self.instance.version(),
            )
            .await?;

        if result.version != *self.instance.version() {
            debug!(
                "get of {} reported version {:?}, caching under {:?}",
                self.instance.resource_type(),
                result.version,
                self.instance.version()
            );
        }

        self.metadata
            .update_metadata(&self.cache_key, &result.metadata)
            .await
            .map_err(|e| GantryError::MetadataPersist {
                key: self.cache_key.clone(),
                source: Box::new(e),
            })?;

        cache.mark_initialized().await?;

        info!(
            "Fetched {} into cache {} on {}",
            self.instance.resource_type(),
            self.cache_key,
            self.worker.name()
        );

        Ok(VersionedSource::new(
            self.instance.version().clone(),
            result.metadata,
            VolumeRef::from_volume(cache.volume().as_ref()),
        ))
    }

    async fn lookup(&self) -> GantryResult<Option<VolumeCache>> {
        let volume = self
            .volumes
            .find_volume_for_cache_key(self.worker.name(), &self.cache_key)
            .await
            .map_err(|e| self.lookup_error(e))?;
        Ok(volume.map(VolumeCache::new))
    }

    /// Reuse a volume left building by an earlier attempt, or allocate one
    async fn volume_for_create(&self) -> GantryResult<VolumeCache> {
        if let Some(cache) = self.lookup().await? {
            debug!("Reusing building volume {}", cache.volume().handle());
            return Ok(cache);
        }

        let volume: Arc<dyn Volume> = self
            .volumes
            .create_volume(self.worker.name(), &self.cache_key)
            .await
            .map_err(|e| GantryError::VolumeCreate {
                key: self.cache_key.clone(),
                worker: self.worker.name().to_string(),
                source: Box::new(e),
            })?;
        Ok(VolumeCache::new(volume))
    }

    fn container_spec_for(&self, volume: &dyn Volume) -> ContainerSpec {
        let get_dir = self.runner.config().get_dir.clone();
        let mut spec = self.container_spec.clone();

        spec.workdir = get_dir.clone();
        spec.volumes.push(VolumeMount {
            handle: volume.handle().to_string(),
            mount_path: get_dir,
        });

        if let Some(certs_dir) = &self.container_config.certs_dir {
            spec.binds.push(BindMount {
                host_path: certs_dir.clone(),
                container_path: self.container_config.certs_mount.clone(),
                readonly: true,
            });
        }

        spec
    }

    fn lookup_error(&self, source: GantryError) -> GantryError {
        GantryError::CacheLookup {
            key: self.cache_key.clone(),
            worker: self.worker.name().to_string(),
            source: Box::new(source),
        }
    }
}
