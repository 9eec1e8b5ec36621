//! Gantry - resource fetch coordination for distributed builds
//!
//! Materializes versioned resource artifacts into worker volumes exactly
//! once per cache key per worker, however many build steps ask for them at
//! the same time.

pub mod cache;
pub mod cancel;
pub mod config;
pub mod error;
pub mod fetch;
pub mod image;
pub mod lock;
pub mod logging;
pub mod memory;
pub mod orchestration;
pub mod resource;
pub mod script;

pub use cancel::{cancellation, CancelHandle, Cancellation};
pub use error::{GantryError, GantryResult};
pub use fetch::{Fetcher, VersionedSource};
