//! In-process durable store.
//!
//! Implements [`DurableStore`] over `DashMap`s. Contents live as long as the
//! store does, which makes it the default backend for tests and for agents
//! that never need to outlive their process.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use nebula_types::error::RepositoryError;
use nebula_types::memory::{DurableEntry, VersionRecord};
use nebula_types::value::MemoryValue;

use super::store::DurableStore;

/// `DashMap`-backed store. Cloning shares the underlying maps.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<DashMap<String, DurableEntry>>,
    history: Arc<DashMap<String, Vec<VersionRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn upsert(&self, key: &str, value: &MemoryValue) {
        let now = Utc::now();
        self.entries
            .entry(key.to_string())
            .and_modify(|e| {
                e.value = value.clone();
                e.updated_at = now;
            })
            .or_insert_with(|| DurableEntry {
                key: key.to_string(),
                value: value.clone(),
                created_at: now,
                updated_at: now,
            });
    }
}

impl DurableStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<MemoryValue>, RepositoryError> {
        Ok(self.entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &MemoryValue) -> Result<(), RepositoryError> {
        self.upsert(key, value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), RepositoryError> {
        self.entries.remove(key);
        self.history.remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>, RepositoryError> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }

    async fn get_entry(&self, key: &str) -> Result<Option<DurableEntry>, RepositoryError> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn get_history(&self, key: &str) -> Result<Vec<VersionRecord>, RepositoryError> {
        Ok(self
            .history
            .get(key)
            .map(|h| h.value().clone())
            .unwrap_or_default())
    }

    async fn append_version_and_set(
        &self,
        key: &str,
        record: &VersionRecord,
    ) -> Result<(), RepositoryError> {
        // The history shard guard is held across both writes, so readers of
        // the history never see a version whose value is not yet current.
        let mut records = self.history.entry(key.to_string()).or_default();
        if records.iter().any(|r| r.version == record.version) {
            return Err(RepositoryError::Conflict(format!(
                "version {} already exists for '{key}'",
                record.version
            )));
        }
        self.upsert(key, &record.value);
        records.push(record.clone());
        Ok(())
    }
}
