//! Versioned writes over a [`DurableStore`].
//!
//! `VersionedStore` owns the version-numbering rule: the first versioned
//! write to a key is version 1 and each later one is the previous maximum
//! plus one. Writes to the same key are serialized through a per-key async
//! mutex so two concurrent writers can never claim the same number. Writes
//! to different keys never wait on each other.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use nebula_types::error::RepositoryError;
use nebula_types::memory::{DurableEntry, VersionRecord};
use nebula_types::value::MemoryValue;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use super::store::DurableStore;

/// Lazily created per-key async locks.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, creating it on first use.
    ///
    /// The `DashMap` shard guard is released before awaiting the mutex.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Number of keys that have ever been locked.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Durable key-value memory with per-key version history.
pub struct VersionedStore<S: DurableStore> {
    store: S,
    locks: KeyedLocks,
}

impl<S: DurableStore> VersionedStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
        }
    }

    /// Access the underlying store.
    pub fn inner(&self) -> &S {
        &self.store
    }

    /// Unconditional overwrite; does not touch version history.
    pub async fn put(&self, key: &str, value: &MemoryValue) -> Result<(), RepositoryError> {
        let _guard = self.locks.lock(key).await;
        self.store.set(key, value).await
    }

    pub async fn get(&self, key: &str) -> Result<Option<MemoryValue>, RepositoryError> {
        self.store.get(key).await
    }

    pub async fn get_entry(&self, key: &str) -> Result<Option<DurableEntry>, RepositoryError> {
        self.store.get_entry(key).await
    }

    /// Append a version record and make `value` current, atomically per key.
    ///
    /// Returns the assigned version number.
    pub async fn put_versioned(
        &self,
        key: &str,
        value: &MemoryValue,
        note: &str,
    ) -> Result<u32, RepositoryError> {
        let _guard = self.locks.lock(key).await;

        let history = self.store.get_history(key).await?;
        let version = history
            .iter()
            .map(|r| r.version)
            .max()
            .map_or(1, |v| v + 1);

        let record = VersionRecord {
            version,
            timestamp: Utc::now(),
            value: value.clone(),
            note: note.to_string(),
        };
        self.store.append_version_and_set(key, &record).await?;

        debug!(key, version, "versioned write");
        Ok(version)
    }

    /// Version history for `key`, oldest first.
    pub async fn get_history(&self, key: &str) -> Result<Vec<VersionRecord>, RepositoryError> {
        self.store.get_history(key).await
    }

    pub async fn keys(&self) -> Result<Vec<String>, RepositoryError> {
        self.store.list_keys().await
    }

    /// Remove a key and its history.
    pub async fn delete(&self, key: &str) -> Result<(), RepositoryError> {
        let _guard = self.locks.lock(key).await;
        self.store.delete(key).await
    }
}
