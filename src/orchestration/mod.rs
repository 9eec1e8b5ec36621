//! Orchestration capabilities
//!
//! Abstract interfaces to the remote systems the fetch engine coordinates:
//! - container runtimes (containers and their processes)
//! - the volume manager
//! - worker selection

mod runtime;
mod spec;
mod volume;
mod worker;

pub use runtime::{Container, ContainerRuntime, Process, ScriptState};
pub use spec::{BindMount, ContainerSpec, OutputBuffer, ProcessIo, ProcessSpec, VolumeMount};
pub use volume::{Volume, VolumeManager};
pub use worker::{Worker, WorkerPool};

/// Max number of stderr lines kept in error messages
const ERROR_TAIL_LINES: usize = 50;

/// Tail of process output for error diagnostics
pub(crate) fn error_output(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let total = lines.len();
    let tail = if total > ERROR_TAIL_LINES {
        &lines[total - ERROR_TAIL_LINES..]
    } else {
        &lines[..]
    };
    tail.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_output_keeps_tail() {
        let stderr: String = (0..60).map(|i| format!("line {}\n", i)).collect();
        let tail = error_output(&stderr);
        assert!(tail.starts_with("line 10"));
        assert!(tail.ends_with("line 59"));
    }

    #[test]
    fn error_output_short_unchanged() {
        assert_eq!(error_output("a\nb\n"), "a\nb");
    }
}
