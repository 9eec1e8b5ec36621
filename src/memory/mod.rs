//! In-process capability backends
//!
//! Implementations of the lock service, volume manager, metadata store,
//! container runtime and worker pool that live entirely in memory. They
//! suit single-host use and record every call for inspection.

mod container;
mod lock;
mod metadata;
mod pool;
mod volume;

pub use container::{
    MemoryContainer, MemoryContainerRuntime, ScriptBehavior, ScriptHandler, ScriptOutcome,
    STOPPED_EXIT_STATUS,
};
pub use lock::{LockOutcome, MemoryLockService};
pub use metadata::MemoryMetadataStore;
pub use pool::FixedWorkerPool;
pub use volume::{MemoryVolume, MemoryVolumeManager};

use std::sync::{Mutex, MutexGuard};

/// A panic while holding one of these mutexes leaves plain data behind
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
