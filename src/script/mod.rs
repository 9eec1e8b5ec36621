//! Resource script execution
//!
//! Runs one resource action (`check`, `get` or `put`) as a process inside a
//! resource container. The request goes to the process as JSON on stdin;
//! the response is read as JSON from stdout.
//!
//! `get` and `put` are recoverable: their state is recorded on the
//! container, so a repeated invocation returns a finished result without
//! rerunning, or re-attaches to a process that is still going.

pub mod protocol;

pub use protocol::{CheckRequest, GetRequest, PutRequest, VersionResult};

use crate::cancel::Cancellation;
use crate::config::schema::ScriptConfig;
use crate::error::{GantryError, GantryResult};
use crate::orchestration::{error_output, Container, Process, ProcessIo, ProcessSpec, ScriptState};
use crate::resource::{Params, Source, Version};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

/// A resource action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Check,
    Get,
    Put,
}

impl Action {
    /// Whether results are persisted on the container and reused
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Get | Self::Put)
    }

    /// Well-known process id for recoverable actions
    pub fn process_id(&self) -> Option<&'static str> {
        match self {
            Self::Check => None,
            Self::Get => Some("resource-get"),
            Self::Put => Some("resource-put"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::Get => "get",
            Self::Put => "put",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs resource scripts inside containers
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    config: ScriptConfig,
}

impl ScriptRunner {
    pub fn new(config: ScriptConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    /// Process to start for `action`
    pub fn process_spec(&self, action: Action) -> ProcessSpec {
        let (path, dir) = match action {
            Action::Check => (self.config.check_path.clone(), None),
            Action::Get => (self.config.in_path.clone(), Some(self.config.get_dir.clone())),
            Action::Put => (self.config.out_path.clone(), Some(self.config.put_dir.clone())),
        };

        ProcessSpec {
            id: action.process_id().map(str::to_string),
            path,
            args: dir.iter().cloned().collect(),
            dir,
        }
    }

    /// Discover versions newer than `from` (all versions if `None`)
    pub async fn check(
        &self,
        cancel: &Cancellation,
        container: &dyn Container,
        source: &Source,
        from: Option<&Version>,
    ) -> GantryResult<Vec<Version>> {
        let request = CheckRequest {
            source,
            version: from,
        };
        self.run(cancel, container, Action::Check, &request).await
    }

    /// Fetch `version` into the container's get directory
    pub async fn get(
        &self,
        cancel: &Cancellation,
        container: &dyn Container,
        source: &Source,
        params: &Params,
        version: &Version,
    ) -> GantryResult<VersionResult> {
        let request = GetRequest {
            source,
            params,
            version,
        };
        self.run(cancel, container, Action::Get, &request).await
    }

    /// Push the contents of the container's put directory
    pub async fn put(
        &self,
        cancel: &Cancellation,
        container: &dyn Container,
        source: &Source,
        params: &Params,
    ) -> GantryResult<VersionResult> {
        let request = PutRequest { source, params };
        self.run(cancel, container, Action::Put, &request).await
    }

    /// Run `action` with `request` on stdin and parse its stdout
    pub async fn run<Req, Res>(
        &self,
        cancel: &Cancellation,
        container: &dyn Container,
        action: Action,
        request: &Req,
    ) -> GantryResult<Res>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        if cancel.is_cancelled() {
            return Err(GantryError::Cancelled);
        }

        let spec = self.process_spec(action);
        let io = ProcessIo::with_stdin(serde_json::to_vec(request)?);

        let process = if action.is_recoverable() {
            match container.script_state(action).await? {
                ScriptState::Completed(raw) => {
                    debug!("{} already completed in {}", action, container.handle());
                    let parsed = parse_output(action, &raw);
                    if parsed.is_err() {
                        record_state(container, action, ScriptState::NoResult).await;
                    }
                    return parsed;
                }
                ScriptState::Running(process_id) => {
                    debug!("Re-attaching to {} process {}", action, process_id);
                    match container.attach(&process_id, io.clone()).await {
                        Ok(process) => process,
                        Err(e) if e.is_cancelled() => return Err(e),
                        Err(e) => {
                            debug!(
                                "Failed to attach to {} process {}, starting a new one: {}",
                                action, process_id, e
                            );
                            self.start_recorded(container, action, &spec, &io).await?
                        }
                    }
                }
                ScriptState::NoResult => self.start_recorded(container, action, &spec, &io).await?,
            }
        } else {
            self.start(container, action, &spec, &io).await?
        };

        let finished = self.finish(cancel, container, action, spec, process, &io).await;
        if finished.is_err() && action.is_recoverable() {
            // the next attempt starts over instead of replaying this one
            record_state(container, action, ScriptState::NoResult).await;
        }
        finished
    }

    /// Wait for `process` and turn its exit and stdout into a result
    async fn finish<Res: DeserializeOwned>(
        &self,
        cancel: &Cancellation,
        container: &dyn Container,
        action: Action,
        spec: ProcessSpec,
        process: Box<dyn Process>,
        io: &ProcessIo,
    ) -> GantryResult<Res> {
        let exit_status = wait_or_stop(cancel, container, process).await?;

        let stderr = io.stderr.to_string_lossy();
        for line in stderr.lines() {
            debug!(action = %action, "{}", line);
        }

        if exit_status != 0 {
            return Err(GantryError::ScriptFailed {
                path: spec.path,
                args: spec.args,
                exit_status,
                stderr: error_output(&stderr),
            });
        }

        let stdout = io.stdout.to_string_lossy();
        let result = parse_output(action, &stdout)?;

        if action.is_recoverable() {
            record_state(container, action, ScriptState::Completed(stdout)).await;
        }

        Ok(result)
    }

    /// Start a recoverable action and record its process for re-attachment
    async fn start_recorded(
        &self,
        container: &dyn Container,
        action: Action,
        spec: &ProcessSpec,
        io: &ProcessIo,
    ) -> GantryResult<Box<dyn Process>> {
        let process = self.start(container, action, spec, io).await?;
        record_state(container, action, ScriptState::Running(process.id().to_string())).await;
        Ok(process)
    }

    async fn start(
        &self,
        container: &dyn Container,
        action: Action,
        spec: &ProcessSpec,
        io: &ProcessIo,
    ) -> GantryResult<Box<dyn Process>> {
        debug!("Running {} {:?} in {}", spec.path, spec.args, container.handle());
        container
            .run(spec, io.clone())
            .await
            .map_err(|e| start_error(action, e))
    }
}

/// Race process exit against cancellation
///
/// On cancellation the container is stopped and the waiter is joined
/// before returning, so no waiter outlives the call.
async fn wait_or_stop(
    cancel: &Cancellation,
    container: &dyn Container,
    process: Box<dyn Process>,
) -> GantryResult<i32> {
    let mut waiter = tokio::spawn(async move { process.wait().await });

    tokio::select! {
        joined = &mut waiter => {
            joined.map_err(|e| GantryError::Internal(format!("process waiter failed: {e}")))?
        }
        _ = cancel.cancelled() => {
            info!("Interrupted, stopping {}", container.handle());
            if let Err(e) = container.stop(false).await {
                warn!("Failed to stop {}: {}", container.handle(), e);
            }
            if let Err(e) = waiter.await {
                warn!("Process waiter failed after stop: {}", e);
            }
            Err(GantryError::Cancelled)
        }
    }
}

/// Script state only speeds up resumption; failing to record it is not fatal
async fn record_state(container: &dyn Container, action: Action, state: ScriptState) {
    if let Err(e) = container.record_script_state(action, state).await {
        warn!("Failed to record {} state on {}: {}", action, container.handle(), e);
    }
}

fn parse_output<T: DeserializeOwned>(action: Action, raw: &str) -> GantryResult<T> {
    serde_json::from_str(raw).map_err(|e| GantryError::ScriptOutput {
        action: action.to_string(),
        reason: e.to_string(),
    })
}

fn start_error(action: Action, source: GantryError) -> GantryError {
    if source.is_cancelled() {
        return source;
    }
    GantryError::ScriptStart {
        action: action.to_string(),
        source: Box::new(source),
    }
}
