//! Distributed advisory locks
//!
//! The lock service is the only serialization point for Create across the
//! cluster. Acquisition never blocks: a held lock reports `None` and the
//! caller decides when to try again.

use crate::error::GantryResult;
use async_trait::async_trait;

/// Named, non-reentrant lock service
#[async_trait]
pub trait LockService: Send + Sync {
    /// Try to take the lock; `Ok(None)` when it is held elsewhere
    async fn try_acquire(&self, name: &str) -> GantryResult<Option<Box<dyn Lock>>>;
}

/// A held lock; must be released explicitly
#[async_trait]
pub trait Lock: Send + Sync {
    fn name(&self) -> &str;

    async fn release(&self) -> GantryResult<()>;
}
