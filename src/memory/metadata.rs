//! In-process metadata store

use super::lock_unpoisoned;
use crate::cache::MetadataStore;
use crate::error::{GantryError, GantryResult};
use crate::resource::MetadataField;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryMetadataStore {
    entries: Mutex<HashMap<String, Vec<MetadataField>>>,
    updates: Mutex<Vec<String>>,
    update_failure: Mutex<Option<String>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys passed to `update_metadata`, in call order
    pub fn updates(&self) -> Vec<String> {
        lock_unpoisoned(&self.updates).clone()
    }

    pub fn fail_updates(&self, reason: impl Into<String>) {
        *lock_unpoisoned(&self.update_failure) = Some(reason.into());
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn update_metadata(&self, key: &str, metadata: &[MetadataField]) -> GantryResult<()> {
        if let Some(reason) = lock_unpoisoned(&self.update_failure).clone() {
            return Err(GantryError::remote("update metadata", reason));
        }

        lock_unpoisoned(&self.updates).push(key.to_string());
        lock_unpoisoned(&self.entries).insert(key.to_string(), metadata.to_vec());
        Ok(())
    }

    async fn read_metadata(&self, key: &str) -> GantryResult<Option<Vec<MetadataField>>> {
        Ok(lock_unpoisoned(&self.entries).get(key).cloned())
    }
}
