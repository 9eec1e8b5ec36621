//! Integration tests for Gantry

use gantry::cache::{lock_name, CacheScope};
use gantry::config::{Config, ConfigManager};
use gantry::memory::{
    FixedWorkerPool, MemoryContainerRuntime, MemoryLockService, MemoryMetadataStore,
    MemoryVolumeManager, ScriptBehavior, ScriptHandler, ScriptOutcome,
};
use gantry::orchestration::{ContainerSpec, ProcessSpec, Worker};
use gantry::resource::{ContainerOwner, MetadataField, Params, ResourceInstance, Source, Version};
use gantry::{cancellation, Cancellation, Fetcher, GantryError};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const GET_RESPONSE: &str = r#"{
    "version": {"ref": "4a2b9f0"},
    "metadata": [
        {"name": "author", "value": "ci"},
        {"name": "message", "value": "bump deps"}
    ]
}"#;

struct Cluster {
    fetcher: Fetcher,
    locks: Arc<MemoryLockService>,
    volumes: Arc<MemoryVolumeManager>,
    runtimes: Vec<Arc<MemoryContainerRuntime>>,
    pool: FixedWorkerPool,
}

impl Cluster {
    fn new(config: &Config, workers: &[&str], handler: Arc<dyn ScriptHandler>) -> Self {
        let locks = Arc::new(MemoryLockService::new());
        let volumes = Arc::new(MemoryVolumeManager::new());
        let runtimes: Vec<_> = workers
            .iter()
            .map(|_| Arc::new(MemoryContainerRuntime::new(handler.clone())))
            .collect();
        let pool = FixedWorkerPool::new(
            workers
                .iter()
                .zip(&runtimes)
                .map(|(name, runtime)| Worker::new(*name, runtime.clone()))
                .collect(),
        );

        Self {
            fetcher: Fetcher::new(
                config,
                locks.clone(),
                volumes.clone(),
                Arc::new(MemoryMetadataStore::new()),
            ),
            locks,
            volumes,
            runtimes,
            pool,
        }
    }

    fn with_behavior(workers: &[&str], behavior: ScriptBehavior) -> Self {
        Self::new(
            &Config::default(),
            workers,
            Arc::new(move |_: &ProcessSpec, _: &[u8]| behavior.clone()),
        )
    }

    async fn fetch(
        &self,
        cancel: &Cancellation,
        instance: &ResourceInstance,
    ) -> Result<gantry::VersionedSource, GantryError> {
        self.fetcher
            .fetch(cancel, instance, &self.pool, &ContainerSpec::new("raw:///git/rootfs"))
            .await
    }

    fn total_runs(&self, owners: &[ContainerOwner]) -> usize {
        self.runtimes
            .iter()
            .flat_map(|runtime| owners.iter().filter_map(|owner| runtime.container(owner)))
            .map(|container| container.run_count())
            .sum()
    }
}

fn git_instance(owner: ContainerOwner) -> ResourceInstance {
    ResourceInstance::new(
        "git",
        Version::from([("ref".to_string(), "4a2b9f0".to_string())]),
        Source::from([
            ("uri".to_string(), json!("https://example.com/app.git")),
            ("branch".to_string(), json!("main")),
        ]),
        Params::from([("depth".to_string(), json!(1))]),
        owner,
    )
}

fn owners(count: u64) -> Vec<ContainerOwner> {
    (1..=count)
        .map(|build| ContainerOwner::build_step(build, "get-app", 1))
        .collect()
}

mod fetch_tests {
    use super::*;
    use futures_util::future::join_all;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn concurrent_fetches_run_get_once() {
        let cluster = Cluster::with_behavior(
            &["w1"],
            ScriptBehavior::Exit(ScriptOutcome::success(GET_RESPONSE)),
        );
        let owners = owners(8);
        let instances: Vec<_> = owners.iter().cloned().map(git_instance).collect();
        let cancel = Cancellation::never();

        let results = join_all(instances.iter().map(|i| cluster.fetch(&cancel, i))).await;
        let results: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();

        assert_eq!(cluster.total_runs(&owners), 1);
        assert_eq!(cluster.volumes.created_count(), 1);
        assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(
            results[0].metadata,
            vec![
                MetadataField::new("author", "ci"),
                MetadataField::new("message", "bump deps"),
            ]
        );

        let name = lock_name(&instances[0], "w1", CacheScope::Worker);
        assert_eq!(cluster.locks.acquisitions(&name), 1);
        assert_eq!(cluster.locks.releases(&name), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_polls_until_cache_populated() {
        let cluster = Cluster::with_behavior(
            &["w1"],
            ScriptBehavior::Delayed(
                Duration::from_secs(12),
                ScriptOutcome::success(GET_RESPONSE),
            ),
        );
        let owners = owners(2);
        let first = git_instance(owners[0].clone());
        let second = git_instance(owners[1].clone());
        let cancel = Cancellation::never();
        let started = Instant::now();

        let (a, b) = tokio::join!(cluster.fetch(&cancel, &first), async {
            let fetched = cluster.fetch(&cancel, &second).await;
            (fetched, started.elapsed())
        });

        let (b, waited) = b;
        assert_eq!(a.unwrap(), b.unwrap());
        assert!(waited >= Duration::from_secs(15));
        assert!(waited < Duration::from_secs(20));

        let name = lock_name(&first, "w1", CacheScope::Worker);
        // one winning attempt, then denials at 0s, 5s and 10s
        assert_eq!(cluster.locks.attempts(&name), 4);
        assert_eq!(cluster.locks.acquisitions(&name), 1);
        assert_eq!(cluster.total_runs(&owners), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn each_worker_materializes_its_own_cache() {
        let cluster = Cluster::with_behavior(
            &["w1", "w2"],
            ScriptBehavior::Exit(ScriptOutcome::success(GET_RESPONSE)),
        );
        let owners = owners(4);
        let instances: Vec<_> = owners.iter().cloned().map(git_instance).collect();
        let cancel = Cancellation::never();

        let results = join_all(instances.iter().map(|i| cluster.fetch(&cancel, i))).await;
        let mut workers: Vec<_> = results
            .into_iter()
            .map(|r| r.unwrap().volume.worker_name)
            .collect();
        workers.sort();
        workers.dedup();

        assert_eq!(workers, vec!["w1".to_string(), "w2".to_string()]);
        assert_eq!(cluster.total_runs(&owners), 2);
        assert_eq!(cluster.volumes.created_count(), 2);
    }

    #[tokio::test]
    async fn failed_get_reports_exit_status() {
        let cluster = Cluster::with_behavior(
            &["w1"],
            ScriptBehavior::Exit(ScriptOutcome::failure(128, "fatal: repository not found\n")),
        );
        let instance = git_instance(owners(1).remove(0));

        let err = cluster.fetch(&Cancellation::never(), &instance).await.unwrap_err();
        assert_eq!(err.exit_status(), Some(128));
        assert!(err.to_string().contains("exit status 128"));
        assert!(!cluster
            .locks
            .is_held(&lock_name(&instance, "w1", CacheScope::Worker)));
    }

    /// Behaves as `first` on the first get and succeeds afterwards
    fn flaky_handler(first: ScriptBehavior) -> (Arc<AtomicUsize>, Arc<dyn ScriptHandler>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = {
            let calls = calls.clone();
            move |_: &ProcessSpec, _: &[u8]| {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    first.clone()
                } else {
                    ScriptBehavior::Exit(ScriptOutcome::success(GET_RESPONSE))
                }
            }
        };
        (calls, Arc::new(handler))
    }

    #[tokio::test]
    async fn cancelled_fetch_retried_by_same_owner() {
        let (calls, handler) = flaky_handler(ScriptBehavior::Hang);
        let cluster = Arc::new(Cluster::new(&Config::default(), &["w1"], handler));
        let owner = owners(1).remove(0);
        let (handle, cancel) = cancellation();

        let hung = {
            let cluster = cluster.clone();
            let instance = git_instance(owner.clone());
            tokio::spawn(async move { cluster.fetch(&cancel, &instance).await })
        };

        while calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.cancel();

        let err = hung.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        let container = cluster.runtimes[0].container(&owner).unwrap();
        assert_eq!(container.stop_calls(), vec![false]);

        let instance = git_instance(owner.clone());
        let retried = cluster.fetch(&Cancellation::never(), &instance).await.unwrap();
        assert_eq!(retried.version, *instance.version());
        assert_eq!(container.run_count(), 2);
        assert_eq!(container.attach_count(), 0);
        assert_eq!(cluster.volumes.created_count(), 1);
    }

    #[tokio::test]
    async fn failed_fetch_retried_by_same_owner() {
        let (calls, handler) =
            flaky_handler(ScriptBehavior::Exit(ScriptOutcome::failure(1, "transient")));
        let cluster = Cluster::new(&Config::default(), &["w1"], handler);
        let owner = owners(1).remove(0);
        let instance = git_instance(owner.clone());

        let err = cluster.fetch(&Cancellation::never(), &instance).await.unwrap_err();
        assert_eq!(err.exit_status(), Some(1));

        let retried = cluster.fetch(&Cancellation::never(), &instance).await.unwrap();
        assert_eq!(retried.metadata.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cluster.runtimes[0].container(&owner).unwrap().run_count(), 2);
        assert_eq!(cluster.volumes.created_count(), 1);
    }
}

mod config_tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn cluster_scope_from_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(
            &path,
            "[fetch]\nretry_interval_ms = 250\ncache_scope = \"cluster\"\n",
        )
        .await
        .unwrap();

        let config = ConfigManager::with_path(path).load().await.unwrap();
        assert_eq!(config.fetch.retry_interval(), Duration::from_millis(250));

        let cluster = Cluster::new(
            &config,
            &["w1"],
            Arc::new(|_: &ProcessSpec, _: &[u8]| {
                ScriptBehavior::Exit(ScriptOutcome::success(GET_RESPONSE))
            }),
        );
        let instance = git_instance(owners(1).remove(0));
        cluster.fetch(&Cancellation::never(), &instance).await.unwrap();

        assert_eq!(cluster.locks.acquisitions(&instance.cache_key()), 1);
    }

    #[tokio::test]
    async fn script_paths_from_config_reach_container() {
        let mut config = Config::default();
        config.script.in_path = "/usr/local/bin/fetch".to_string();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let handler = {
            let seen = seen.clone();
            move |spec: &ProcessSpec, _: &[u8]| {
                seen.lock().unwrap().push(spec.path.clone());
                ScriptBehavior::Exit(ScriptOutcome::success(GET_RESPONSE))
            }
        };
        let cluster = Cluster::new(&config, &["w1"], Arc::new(handler));

        cluster
            .fetch(&Cancellation::never(), &git_instance(owners(1).remove(0)))
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["/usr/local/bin/fetch".to_string()]);
    }
}

mod image_tests {
    use super::*;
    use gantry::image::{resolve_image, ImageSource};

    #[tokio::test]
    async fn resource_image_resolves_to_rootfs() {
        let cluster = Cluster::with_behavior(
            &["w1"],
            ScriptBehavior::Exit(ScriptOutcome::success(r#"{"version": {"digest": "sha256:ff"}}"#)),
        );
        let image = ImageSource::Resource(ResourceInstance::new(
            "registry-image",
            Version::from([("digest".to_string(), "sha256:ff".to_string())]),
            Source::from([("repository".to_string(), json!("alpine"))]),
            Params::new(),
            ContainerOwner::Image {
                parent: "build-7-test".to_string(),
            },
        ));

        let resolved = resolve_image(
            &cluster.fetcher,
            &Cancellation::never(),
            &cluster.pool,
            &image,
            &ContainerSpec::new("raw:///registry-image/rootfs"),
        )
        .await
        .unwrap();

        assert!(resolved.rootfs.ends_with("/rootfs"));
        assert_eq!(resolved.url(), format!("raw://{}", resolved.rootfs));
        assert_eq!(cluster.volumes.created_count(), 1);
    }
}
