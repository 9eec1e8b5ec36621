//! Worker pool over a fixed set of workers

use crate::error::{GantryError, GantryResult};
use crate::orchestration::{ContainerSpec, Worker, WorkerPool};
use crate::resource::ContainerOwner;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Keeps each owner on the worker hosting its container, otherwise
/// chooses round-robin
///
/// Placement is derived from the workers' containers, so the pool holds no
/// per-owner state.
pub struct FixedWorkerPool {
    workers: Vec<Worker>,
    next: AtomicUsize,
}

impl FixedWorkerPool {
    pub fn new(workers: Vec<Worker>) -> Self {
        Self {
            workers,
            next: AtomicUsize::new(0),
        }
    }

    pub fn single(worker: Worker) -> Self {
        Self::new(vec![worker])
    }
}

#[async_trait]
impl WorkerPool for FixedWorkerPool {
    async fn find_or_choose_worker(
        &self,
        owner: &ContainerOwner,
        _spec: &ContainerSpec,
    ) -> GantryResult<Worker> {
        if self.workers.is_empty() {
            return Err(GantryError::WorkerSelection(
                "no workers registered".to_string(),
            ));
        }

        for worker in &self.workers {
            if worker.containers().find_container(owner).await?.is_some() {
                return Ok(worker.clone());
            }
        }

        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        Ok(self.workers[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryContainerRuntime, ScriptBehavior, ScriptOutcome};
    use crate::orchestration::ProcessSpec;
    use std::sync::Arc;

    fn worker(name: &str) -> Worker {
        let runtime = MemoryContainerRuntime::new(Arc::new(|_: &ProcessSpec, _: &[u8]| {
            ScriptBehavior::Exit(ScriptOutcome::success("{}"))
        }));
        Worker::new(name, Arc::new(runtime))
    }

    #[tokio::test]
    async fn new_owners_round_robin() {
        let pool = FixedWorkerPool::new(vec![worker("w1"), worker("w2")]);
        let spec = ContainerSpec::default();

        let mut chosen = Vec::new();
        for build in 1..=3 {
            let owner = ContainerOwner::build_step(build, "get", 1);
            chosen.push(pool.find_or_choose_worker(&owner, &spec).await.unwrap());
        }

        let names: Vec<_> = chosen.iter().map(|w| w.name()).collect();
        assert_eq!(names, vec!["w1", "w2", "w1"]);
    }

    #[tokio::test]
    async fn owner_sticks_to_worker_with_its_container() {
        let pool = FixedWorkerPool::new(vec![worker("w1"), worker("w2")]);
        let spec = ContainerSpec::default();
        let owner = ContainerOwner::build_step(1, "get", 1);
        let other = ContainerOwner::build_step(2, "get", 1);

        pool.find_or_choose_worker(&other, &spec).await.unwrap();
        let chosen = pool.find_or_choose_worker(&owner, &spec).await.unwrap();
        assert_eq!(chosen.name(), "w2");
        chosen
            .containers()
            .find_or_create_container(&owner, &spec)
            .await
            .unwrap();

        for _ in 0..3 {
            let again = pool.find_or_choose_worker(&owner, &spec).await.unwrap();
            assert_eq!(again.name(), "w2");
        }
    }

    #[tokio::test]
    async fn empty_pool_errors() {
        let pool = FixedWorkerPool::new(vec![]);
        let err = pool
            .find_or_choose_worker(&ContainerOwner::build_step(1, "a", 1), &ContainerSpec::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GantryError::WorkerSelection(_)));
    }
}
