//! In-process container runtime
//!
//! Scripts are answered by a `ScriptHandler` instead of real executables.
//! Every call is recorded so callers can inspect what the engine did.

use super::lock_unpoisoned;
use crate::error::{GantryError, GantryResult};
use crate::orchestration::{
    Container, ContainerRuntime, ContainerSpec, Process, ProcessIo, ProcessSpec, ScriptState,
};
use crate::resource::ContainerOwner;
use crate::script::Action;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// Exit status reported by a process ended by `stop`
pub const STOPPED_EXIT_STATUS: i32 = 143;

/// Output and exit status of a finished script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutcome {
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ScriptOutcome {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(exit_status: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// How a started process behaves
#[derive(Debug, Clone)]
pub enum ScriptBehavior {
    /// Exit as soon as it is waited on
    Exit(ScriptOutcome),
    /// Exit after a delay
    Delayed(Duration, ScriptOutcome),
    /// Run until the container is stopped
    Hang,
}

/// Decides the behavior of each started process
pub trait ScriptHandler: Send + Sync {
    fn handle(&self, spec: &ProcessSpec, stdin: &[u8]) -> ScriptBehavior;
}

impl<F> ScriptHandler for F
where
    F: Fn(&ProcessSpec, &[u8]) -> ScriptBehavior + Send + Sync,
{
    fn handle(&self, spec: &ProcessSpec, stdin: &[u8]) -> ScriptBehavior {
        self(spec, stdin)
    }
}

/// Container runtime for one in-process worker
pub struct MemoryContainerRuntime {
    handler: Arc<dyn ScriptHandler>,
    containers: Mutex<HashMap<ContainerOwner, Arc<MemoryContainer>>>,
    specs: Mutex<Vec<ContainerSpec>>,
    creation_failure: Mutex<Option<String>>,
}

impl MemoryContainerRuntime {
    pub fn new(handler: Arc<dyn ScriptHandler>) -> Self {
        Self {
            handler,
            containers: Mutex::new(HashMap::new()),
            specs: Mutex::new(Vec::new()),
            creation_failure: Mutex::new(None),
        }
    }

    /// The owner's container, if one was created
    pub fn container(&self, owner: &ContainerOwner) -> Option<Arc<MemoryContainer>> {
        lock_unpoisoned(&self.containers).get(owner).cloned()
    }

    /// Specs of every container created so far
    pub fn created_specs(&self) -> Vec<ContainerSpec> {
        lock_unpoisoned(&self.specs).clone()
    }

    /// Make subsequent container creation fail
    pub fn fail_creation(&self, reason: impl Into<String>) {
        *lock_unpoisoned(&self.creation_failure) = Some(reason.into());
    }
}

#[async_trait]
impl ContainerRuntime for MemoryContainerRuntime {
    async fn find_container(&self, owner: &ContainerOwner) -> GantryResult<Option<Arc<dyn Container>>> {
        Ok(self
            .container(owner)
            .map(|container| container as Arc<dyn Container>))
    }

    async fn find_or_create_container(
        &self,
        owner: &ContainerOwner,
        spec: &ContainerSpec,
    ) -> GantryResult<Arc<dyn Container>> {
        let mut containers = lock_unpoisoned(&self.containers);
        if let Some(existing) = containers.get(owner) {
            let existing: Arc<dyn Container> = existing.clone();
            return Ok(existing);
        }

        if let Some(reason) = lock_unpoisoned(&self.creation_failure).clone() {
            return Err(GantryError::remote("create container", reason));
        }

        let container = MemoryContainer::new(self.handler.clone());
        containers.insert(owner.clone(), container.clone());
        lock_unpoisoned(&self.specs).push(spec.clone());
        Ok(container)
    }
}

#[derive(Default)]
struct ContainerRecord {
    states: HashMap<Action, ScriptState>,
    recorded: Vec<(Action, ScriptState)>,
    processes: HashMap<String, ScriptBehavior>,
    runs: Vec<ProcessSpec>,
    attaches: Vec<String>,
    stdins: Vec<Vec<u8>>,
    stops: Vec<bool>,
    state_failure: Option<String>,
    next_process: u64,
}

/// An in-process container
pub struct MemoryContainer {
    handle: String,
    handler: Arc<dyn ScriptHandler>,
    record: Mutex<ContainerRecord>,
    stopped: watch::Sender<bool>,
}

impl MemoryContainer {
    pub fn new(handler: Arc<dyn ScriptHandler>) -> Arc<Self> {
        let (stopped, _) = watch::channel(false);
        Arc::new(Self {
            handle: format!("container-{}", Uuid::new_v4()),
            handler,
            record: Mutex::new(ContainerRecord::default()),
            stopped,
        })
    }

    /// Pretend a previous attempt left `state` behind for `action`
    pub fn seed_state(&self, action: Action, state: ScriptState) {
        lock_unpoisoned(&self.record).states.insert(action, state);
    }

    /// Pretend a process with `id` is running
    pub fn seed_process(&self, id: impl Into<String>, behavior: ScriptBehavior) {
        lock_unpoisoned(&self.record)
            .processes
            .insert(id.into(), behavior);
    }

    /// Make subsequent `record_script_state` calls fail
    pub fn fail_state_records(&self, reason: impl Into<String>) {
        lock_unpoisoned(&self.record).state_failure = Some(reason.into());
    }

    pub fn script_state_now(&self, action: Action) -> ScriptState {
        lock_unpoisoned(&self.record)
            .states
            .get(&action)
            .cloned()
            .unwrap_or(ScriptState::NoResult)
    }

    /// States written through `record_script_state`, in order
    pub fn recorded_states(&self) -> Vec<(Action, ScriptState)> {
        lock_unpoisoned(&self.record).recorded.clone()
    }

    pub fn runs(&self) -> Vec<ProcessSpec> {
        lock_unpoisoned(&self.record).runs.clone()
    }

    pub fn run_count(&self) -> usize {
        lock_unpoisoned(&self.record).runs.len()
    }

    pub fn attaches(&self) -> Vec<String> {
        lock_unpoisoned(&self.record).attaches.clone()
    }

    pub fn attach_count(&self) -> usize {
        lock_unpoisoned(&self.record).attaches.len()
    }

    /// Stdin of every run and attach, in order
    pub fn stdins(&self) -> Vec<Vec<u8>> {
        lock_unpoisoned(&self.record).stdins.clone()
    }

    /// `kill` flag of every stop call
    pub fn stop_calls(&self) -> Vec<bool> {
        lock_unpoisoned(&self.record).stops.clone()
    }

    fn process(&self, id: String, behavior: ScriptBehavior, io: ProcessIo) -> Box<dyn Process> {
        Box::new(MemoryProcess {
            id,
            behavior,
            io,
            stopped: self.stopped.subscribe(),
        })
    }
}

#[async_trait]
impl Container for MemoryContainer {
    fn handle(&self) -> &str {
        &self.handle
    }

    async fn run(&self, spec: &ProcessSpec, io: ProcessIo) -> GantryResult<Box<dyn Process>> {
        let behavior = self.handler.handle(spec, &io.stdin);

        let id = {
            let mut record = lock_unpoisoned(&self.record);
            record.next_process += 1;
            let id = spec
                .id
                .clone()
                .unwrap_or_else(|| format!("process-{}", record.next_process));
            record.processes.insert(id.clone(), behavior.clone());
            record.runs.push(spec.clone());
            record.stdins.push(io.stdin.clone());
            id
        };

        Ok(self.process(id, behavior, io))
    }

    async fn attach(&self, process_id: &str, io: ProcessIo) -> GantryResult<Box<dyn Process>> {
        let behavior = {
            let mut record = lock_unpoisoned(&self.record);
            record.attaches.push(process_id.to_string());
            record.stdins.push(io.stdin.clone());
            record.processes.get(process_id).cloned()
        };

        match behavior {
            Some(behavior) => Ok(self.process(process_id.to_string(), behavior, io)),
            None => Err(GantryError::ProcessNotFound(process_id.to_string())),
        }
    }

    async fn stop(&self, kill: bool) -> GantryResult<()> {
        lock_unpoisoned(&self.record).stops.push(kill);
        self.stopped.send_replace(true);
        Ok(())
    }

    async fn script_state(&self, action: Action) -> GantryResult<ScriptState> {
        Ok(self.script_state_now(action))
    }

    async fn record_script_state(&self, action: Action, state: ScriptState) -> GantryResult<()> {
        let mut record = lock_unpoisoned(&self.record);
        if let Some(reason) = record.state_failure.clone() {
            return Err(GantryError::remote("set container property", reason));
        }
        record.recorded.push((action, state.clone()));
        record.states.insert(action, state);
        Ok(())
    }
}

struct MemoryProcess {
    id: String,
    behavior: ScriptBehavior,
    io: ProcessIo,
    stopped: watch::Receiver<bool>,
}

impl MemoryProcess {
    fn emit(&self, outcome: &ScriptOutcome) -> i32 {
        self.io.stdout.write(outcome.stdout.as_bytes());
        self.io.stderr.write(outcome.stderr.as_bytes());
        outcome.exit_status
    }
}

#[async_trait]
impl Process for MemoryProcess {
    fn id(&self) -> &str {
        &self.id
    }

    async fn wait(&self) -> GantryResult<i32> {
        match &self.behavior {
            ScriptBehavior::Exit(outcome) => Ok(self.emit(outcome)),
            ScriptBehavior::Delayed(delay, outcome) => {
                tokio::time::sleep(*delay).await;
                Ok(self.emit(outcome))
            }
            ScriptBehavior::Hang => {
                let mut stopped = self.stopped.clone();
                stopped
                    .wait_for(|stopped| *stopped)
                    .await
                    .map(|_| ())
                    .map_err(|_| GantryError::Internal("container dropped".to_string()))?;
                Ok(STOPPED_EXIT_STATUS)
            }
        }
    }
}
