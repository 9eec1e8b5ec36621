//! Container and process specifications
//!
//! Plain data handed to a container runtime. Runtimes translate these
//! into their own wire formats.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Container configuration for a resource container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerSpec {
    /// Root filesystem of the resource type
    pub image: String,
    /// Working directory inside the container
    pub workdir: String,
    /// Worker volumes to mount
    pub volumes: Vec<VolumeMount>,
    /// Host paths to bind-mount
    pub binds: Vec<BindMount>,
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }
}

/// A worker volume mounted into a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub handle: String,
    pub mount_path: String,
}

impl fmt::Display for VolumeMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.handle, self.mount_path)
    }
}

/// A host path (e.g. a TLS trust bundle) mounted into a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub host_path: PathBuf,
    pub container_path: String,
    pub readonly: bool,
}

impl fmt::Display for BindMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ro = if self.readonly { ":ro" } else { "" };
        write!(f, "{}:{}{}", self.host_path.display(), self.container_path, ro)
    }
}

/// Process to run inside a container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessSpec {
    /// Well-known id so the process can be re-attached
    pub id: Option<String>,
    pub path: String,
    pub args: Vec<String>,
    /// Working directory, the container's if unset
    pub dir: Option<String>,
}

/// Shared sink a runtime writes process output into
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&self, bytes: &[u8]) {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend_from_slice(bytes);
    }

    pub fn contents(&self) -> Vec<u8> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

/// Standard streams of a run or attach
#[derive(Debug, Clone, Default)]
pub struct ProcessIo {
    pub stdin: Vec<u8>,
    pub stdout: OutputBuffer,
    pub stderr: OutputBuffer,
}

impl ProcessIo {
    pub fn with_stdin(stdin: Vec<u8>) -> Self {
        Self {
            stdin,
            ..Self::default()
        }
    }
}
