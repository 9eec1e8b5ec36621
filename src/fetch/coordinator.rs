//! Lock-coordinated fetching
//!
//! Each attempt checks the cache, then tries the lock, then creates. A
//! held lock means a competitor is creating; the attempt is repeated after
//! the retry interval, and the cache is checked again first because the
//! competitor has likely populated it by then.

use crate::cache::{CacheScope, MetadataStore};
use crate::cancel::Cancellation;
use crate::config::schema::{ContainerConfig, FetchConfig};
use crate::config::Config;
use crate::error::{GantryError, GantryResult};
use crate::fetch::{FetchSource, VersionedSource};
use crate::lock::LockService;
use crate::orchestration::{ContainerSpec, VolumeManager, Worker, WorkerPool};
use crate::resource::ResourceInstance;
use crate::script::ScriptRunner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fetches resource instances onto workers, materializing each cache once
pub struct Fetcher {
    locks: Arc<dyn LockService>,
    volumes: Arc<dyn VolumeManager>,
    metadata: Arc<dyn MetadataStore>,
    runner: ScriptRunner,
    fetch_config: FetchConfig,
    container_config: ContainerConfig,
}

impl Fetcher {
    pub fn new(
        config: &Config,
        locks: Arc<dyn LockService>,
        volumes: Arc<dyn VolumeManager>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            locks,
            volumes,
            metadata,
            runner: ScriptRunner::new(config.script.clone()),
            fetch_config: config.fetch.clone(),
            container_config: config.container.clone(),
        }
    }

    pub fn runner(&self) -> &ScriptRunner {
        &self.runner
    }

    pub fn retry_interval(&self) -> Duration {
        self.fetch_config.retry_interval()
    }

    pub fn cache_scope(&self) -> CacheScope {
        self.fetch_config.cache_scope
    }

    /// Fetch session for `instance` on an already chosen worker
    pub fn source<'a>(
        &'a self,
        instance: &'a ResourceInstance,
        worker: Worker,
        spec: &'a ContainerSpec,
    ) -> FetchSource<'a> {
        FetchSource::new(
            instance,
            worker,
            spec,
            &self.container_config,
            self.volumes.as_ref(),
            self.metadata.as_ref(),
            &self.runner,
        )
    }

    /// Choose a worker from `pool` and fetch `instance` onto it
    pub async fn fetch(
        &self,
        cancel: &Cancellation,
        instance: &ResourceInstance,
        pool: &dyn WorkerPool,
        spec: &ContainerSpec,
    ) -> GantryResult<VersionedSource> {
        let worker = pool
            .find_or_choose_worker(instance.container_owner(), spec)
            .await?;
        self.fetch_on(cancel, instance, worker, spec).await
    }

    /// Fetch `instance` onto `worker`
    ///
    /// Retries only on lock contention, until the cache is populated, the
    /// Create finishes, or `cancel` fires.
    pub async fn fetch_on(
        &self,
        cancel: &Cancellation,
        instance: &ResourceInstance,
        worker: Worker,
        spec: &ContainerSpec,
    ) -> GantryResult<VersionedSource> {
        let source = self.source(instance, worker, spec);
        let lock = instance.lock_name(source.worker().name(), self.cache_scope());

        loop {
            if cancel.is_cancelled() {
                return Err(GantryError::Cancelled);
            }

            match self.fetch_with_lock(cancel, &source, &lock).await {
                Ok(fetched) => return Ok(fetched),
                Err(e) if e.is_retryable() => {
                    debug!("{}, retrying in {:?}", e, self.retry_interval());
                }
                Err(e) => return Err(e),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.retry_interval()) => {}
                _ = cancel.cancelled() => return Err(GantryError::Cancelled),
            }
        }
    }

    async fn fetch_with_lock(
        &self,
        cancel: &Cancellation,
        source: &FetchSource<'_>,
        lock_name: &str,
    ) -> GantryResult<VersionedSource> {
        if let Some(found) = source.find().await? {
            info!("Cache hit for {} on {}", source.cache_key(), source.worker().name());
            return Ok(found);
        }

        let lock = match self.locks.try_acquire(lock_name).await {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                return Err(GantryError::LockUnavailable {
                    name: lock_name.to_string(),
                })
            }
            Err(e) => {
                warn!("Failed to acquire lock {}: {}", lock_name, e);
                return Err(GantryError::LockService {
                    name: lock_name.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        debug!("Acquired lock {}", lock.name());
        let created = source.create(cancel).await;

        if let Err(e) = lock.release().await {
            warn!("Failed to release lock {}: {}", lock.name(), e);
        }

        created
    }
}
