//! Ephemeral key-value data held alongside the conversation buffer.
//!
//! `Scratchpad` is a concurrent map backed by `DashMap`. Values are cloned on
//! read so no `DashMap` guard outlives the call (holding one across an
//! `.await` would deadlock). Nothing here is ever persisted.

use std::sync::Arc;

use dashmap::DashMap;
use nebula_types::value::MemoryValue;

/// Concurrent in-memory scratch data for an agent.
///
/// Cloning produces a shared view of the same underlying data.
#[derive(Debug, Clone, Default)]
pub struct Scratchpad {
    inner: Arc<DashMap<String, MemoryValue>>,
}

impl Scratchpad {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cloned copy of the value at `key`, or `None` if absent.
    pub fn get(&self, key: &str) -> Option<MemoryValue> {
        self.inner.get(key).map(|r| r.value().clone())
    }

    /// Insert or overwrite a value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<MemoryValue>) {
        self.inner.insert(key.into(), value.into());
    }

    /// Remove a key and return its value, if present.
    pub fn remove(&self, key: &str) -> Option<MemoryValue> {
        self.inner.remove(key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.iter().map(|r| r.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }
}
