//! Error types for Gantry
//!
//! All modules use `GantryResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Gantry operations
pub type GantryResult<T> = Result<T, GantryError>;

/// All errors that can occur in Gantry
#[derive(Error, Debug)]
pub enum GantryError {
    // Lock errors
    #[error("Lock {name} is held elsewhere")]
    LockUnavailable { name: String },

    #[error("Lock service failed for {name}: {reason}")]
    LockService { name: String, reason: String },

    // Cache errors
    #[error("Cache lookup failed for key {key} on worker {worker}: {source}")]
    CacheLookup {
        key: String,
        worker: String,
        #[source]
        source: Box<GantryError>,
    },

    #[error("Failed to create cache volume for key {key} on worker {worker}: {source}")]
    VolumeCreate {
        key: String,
        worker: String,
        #[source]
        source: Box<GantryError>,
    },

    #[error("Failed to mark volume {handle} initialized: {source}")]
    VolumeInitialize {
        handle: String,
        #[source]
        source: Box<GantryError>,
    },

    #[error("Failed to persist metadata for key {key}: {source}")]
    MetadataPersist {
        key: String,
        #[source]
        source: Box<GantryError>,
    },

    // Container errors
    #[error("Failed to create container on worker {worker}: {source}")]
    ContainerCreate {
        worker: String,
        #[source]
        source: Box<GantryError>,
    },

    #[error("No worker available: {0}")]
    WorkerSelection(String),

    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    // Script errors
    #[error("Failed to start {action} script: {source}")]
    ScriptStart {
        action: String,
        #[source]
        source: Box<GantryError>,
    },

    #[error("Resource script {path} {args:?} failed: exit status {exit_status}\n\nstderr:\n{stderr}")]
    ScriptFailed {
        path: String,
        args: Vec<String>,
        exit_status: i32,
        stderr: String,
    },

    #[error("Invalid {action} script output: {reason}")]
    ScriptOutput { action: String, reason: String },

    #[error("Interrupted")]
    Cancelled,

    // Backend errors
    #[error("{operation} failed: {reason}")]
    Remote { operation: String, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GantryError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a backend failure for the named remote operation
    pub fn remote(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Remote {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Check if the coordinator should retry after this error
    ///
    /// Only lock contention is retried. Failures inside Create are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockUnavailable { .. } | Self::LockService { .. })
    }

    /// Check if this error stems from caller cancellation, at any depth
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::CacheLookup { source, .. }
            | Self::VolumeCreate { source, .. }
            | Self::VolumeInitialize { source, .. }
            | Self::MetadataPersist { source, .. }
            | Self::ContainerCreate { source, .. }
            | Self::ScriptStart { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Exit status of a failed resource script, if that is what this is
    pub fn exit_status(&self) -> Option<i32> {
        match self {
            Self::ScriptFailed { exit_status, .. } => Some(*exit_status),
            _ => None,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ScriptFailed { .. } => Some("Check the resource's stderr output for details"),
            Self::ConfigInvalid { .. } => Some("Fix the configuration file or remove it to use defaults"),
            _ => None,
        }
    }
}
