//! Workers and worker selection

use crate::error::GantryResult;
use crate::orchestration::runtime::ContainerRuntime;
use crate::orchestration::spec::ContainerSpec;
use crate::resource::ContainerOwner;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// A worker chosen to run a fetch
#[derive(Clone)]
pub struct Worker {
    name: String,
    containers: Arc<dyn ContainerRuntime>,
}

impl Worker {
    pub fn new(name: impl Into<String>, containers: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            name: name.into(),
            containers,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn containers(&self) -> &Arc<dyn ContainerRuntime> {
        &self.containers
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker").field("name", &self.name).finish()
    }
}

/// Chooses where an owner's container runs
#[async_trait]
pub trait WorkerPool: Send + Sync {
    /// The worker already hosting the owner's container, or a fresh choice
    async fn find_or_choose_worker(
        &self,
        owner: &ContainerOwner,
        spec: &ContainerSpec,
    ) -> GantryResult<Worker>;
}
