//! Container runtime abstraction
//!
//! Provides traits for the container operations the fetch engine needs.
//! Backends implement them against a remote runtime; the `memory` module
//! implements them in-process.

use crate::error::GantryResult;
use crate::orchestration::spec::{ContainerSpec, ProcessIo, ProcessSpec};
use crate::resource::ContainerOwner;
use crate::script::Action;
use async_trait::async_trait;
use std::sync::Arc;

/// Container runtime on one worker
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// The owner's existing container on this worker, if any
    async fn find_container(&self, owner: &ContainerOwner) -> GantryResult<Option<Arc<dyn Container>>>;

    /// Return the owner's existing container, or create one from `spec`
    async fn find_or_create_container(
        &self,
        owner: &ContainerOwner,
        spec: &ContainerSpec,
    ) -> GantryResult<Arc<dyn Container>>;
}

/// What a container knows about a resource script it ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptState {
    /// Nothing started yet
    NoResult,
    /// Started under this process id, outcome unknown
    Running(String),
    /// Exited successfully with this stdout
    Completed(String),
}

/// A running resource container
#[async_trait]
pub trait Container: Send + Sync {
    fn handle(&self) -> &str;

    /// Start a new process
    async fn run(&self, spec: &ProcessSpec, io: ProcessIo) -> GantryResult<Box<dyn Process>>;

    /// Attach to a process started earlier
    async fn attach(&self, process_id: &str, io: ProcessIo) -> GantryResult<Box<dyn Process>>;

    /// Stop the container's processes; `kill` sends a hard signal
    async fn stop(&self, kill: bool) -> GantryResult<()>;

    /// Recorded state of the script for `action`
    async fn script_state(&self, action: Action) -> GantryResult<ScriptState>;

    async fn record_script_state(&self, action: Action, state: ScriptState) -> GantryResult<()>;
}

/// A process inside a container
#[async_trait]
pub trait Process: Send + Sync {
    fn id(&self) -> &str;

    /// Block until the process exits, returning its exit status
    async fn wait(&self) -> GantryResult<i32>;
}
