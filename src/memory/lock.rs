//! In-process lock service
//!
//! Behaves like a non-blocking named lock table. Outcomes can be forced
//! ahead of time to exercise contention and lock service failures.

use super::lock_unpoisoned;
use crate::error::{GantryError, GantryResult};
use crate::lock::{Lock, LockService};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Forced result of the next acquisition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    /// Report the lock as held elsewhere
    Deny,
    /// Fail as if the lock service were unreachable
    Fail(String),
}

#[derive(Default)]
struct LockTable {
    held: HashSet<String>,
    forced: VecDeque<LockOutcome>,
    attempts: HashMap<String, usize>,
    acquisitions: HashMap<String, usize>,
    releases: HashMap<String, usize>,
}

/// Lock service backed by a process-local table
#[derive(Clone, Default)]
pub struct MemoryLockService {
    table: Arc<Mutex<LockTable>>,
}

impl MemoryLockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for the next attempts, in order, on any lock name
    pub fn force(&self, outcomes: impl IntoIterator<Item = LockOutcome>) {
        lock_unpoisoned(&self.table).forced.extend(outcomes);
    }

    pub fn is_held(&self, name: &str) -> bool {
        lock_unpoisoned(&self.table).held.contains(name)
    }

    pub fn attempts(&self, name: &str) -> usize {
        count(&lock_unpoisoned(&self.table).attempts, name)
    }

    pub fn acquisitions(&self, name: &str) -> usize {
        count(&lock_unpoisoned(&self.table).acquisitions, name)
    }

    pub fn releases(&self, name: &str) -> usize {
        count(&lock_unpoisoned(&self.table).releases, name)
    }

    /// Attempts across all lock names
    pub fn total_attempts(&self) -> usize {
        lock_unpoisoned(&self.table).attempts.values().sum()
    }
}

fn count(counts: &HashMap<String, usize>, name: &str) -> usize {
    counts.get(name).copied().unwrap_or(0)
}

#[async_trait]
impl LockService for MemoryLockService {
    async fn try_acquire(&self, name: &str) -> GantryResult<Option<Box<dyn Lock>>> {
        let mut table = lock_unpoisoned(&self.table);
        *table.attempts.entry(name.to_string()).or_default() += 1;

        match table.forced.pop_front() {
            Some(LockOutcome::Deny) => return Ok(None),
            Some(LockOutcome::Fail(reason)) => {
                return Err(GantryError::remote("acquire lock", reason))
            }
            None => {}
        }

        if !table.held.insert(name.to_string()) {
            debug!("Lock {} already held", name);
            return Ok(None);
        }
        *table.acquisitions.entry(name.to_string()).or_default() += 1;

        Ok(Some(Box::new(MemoryLock {
            name: name.to_string(),
            table: self.table.clone(),
            released: AtomicBool::new(false),
        })))
    }
}

struct MemoryLock {
    name: String,
    table: Arc<Mutex<LockTable>>,
    released: AtomicBool,
}

#[async_trait]
impl Lock for MemoryLock {
    fn name(&self) -> &str {
        &self.name
    }

    async fn release(&self) -> GantryResult<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Err(GantryError::remote(
                "release lock",
                format!("{} already released", self.name),
            ));
        }

        let mut table = lock_unpoisoned(&self.table);
        table.held.remove(&self.name);
        *table.releases.entry(self.name.clone()).or_default() += 1;
        Ok(())
    }
}
