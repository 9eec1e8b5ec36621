//! Cache volume state
//!
//! Wraps a worker volume and tracks whether it holds a finalized
//! artifact. A volume becomes initialized exactly once, after a
//! successful Create; from then on it is read-only to this engine.

use crate::error::{GantryError, GantryResult};
use crate::orchestration::Volume;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// State of a cache slot on a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    /// No volume exists (will be created)
    Miss,
    /// Volume exists but no Create finished on it
    Building,
    /// Volume is finalized and immutable
    Complete,
}

impl CacheState {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Miss => write!(f, "miss"),
            Self::Building => write!(f, "building"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// A volume viewed as a cache slot
#[derive(Clone)]
pub struct VolumeCache {
    volume: Arc<dyn Volume>,
}

impl VolumeCache {
    pub fn new(volume: Arc<dyn Volume>) -> Self {
        Self { volume }
    }

    pub fn volume(&self) -> &Arc<dyn Volume> {
        &self.volume
    }

    pub async fn is_initialized(&self) -> GantryResult<bool> {
        self.volume.is_initialized().await
    }

    pub async fn state(&self) -> GantryResult<CacheState> {
        if self.is_initialized().await? {
            Ok(CacheState::Complete)
        } else {
            Ok(CacheState::Building)
        }
    }

    pub async fn mark_initialized(&self) -> GantryResult<()> {
        self.volume
            .mark_initialized()
            .await
            .map_err(|e| GantryError::VolumeInitialize {
                handle: self.volume.handle().to_string(),
                source: Box::new(e),
            })
    }
}

/// State of an optional slot; no volume at all is a miss
pub async fn slot_state(cache: Option<&VolumeCache>) -> GantryResult<CacheState> {
    match cache {
        Some(cache) => cache.state().await,
        None => Ok(CacheState::Miss),
    }
}
