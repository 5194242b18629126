//! Durable store trait.
//!
//! Defines the interface for persistent key-value storage with version
//! history. Implementations: [`InMemoryStore`](super::in_memory::InMemoryStore)
//! here, and the SQLite store in nebula-infra.

use nebula_types::error::RepositoryError;
use nebula_types::memory::{DurableEntry, VersionRecord};
use nebula_types::value::MemoryValue;

/// Trait for persistent key-value storage scoped to one memory bucket.
///
/// These are raw primitives. Version numbering and per-key serialization
/// are the job of [`VersionedStore`](super::versioned::VersionedStore);
/// callers should go through it rather than call `append_version_and_set`
/// directly.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait DurableStore: Send + Sync {
    /// Get a value by key. Returns None if the key does not exist.
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<MemoryValue>, RepositoryError>> + Send;

    /// Set a value for a key (upsert).
    fn set(
        &self,
        key: &str,
        value: &MemoryValue,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete a key and its version history. No-op if the key does not exist.
    fn delete(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// List all keys, in a stable order.
    fn list_keys(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<String>, RepositoryError>> + Send;

    /// Get the full entry including timestamps.
    fn get_entry(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<DurableEntry>, RepositoryError>> + Send;

    /// Version history for a key, oldest first. Empty if none exists.
    fn get_history(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Vec<VersionRecord>, RepositoryError>> + Send;

    /// Append a record to a key's history and make its value current.
    ///
    /// Both writes land or neither does. A record whose version already
    /// exists is rejected with `RepositoryError::Conflict` and leaves the
    /// current value untouched.
    fn append_version_and_set(
        &self,
        key: &str,
        record: &VersionRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
