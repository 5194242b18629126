//! SQLite durable store implementation.
//!
//! Implements `DurableStore` from `nebula-core` using sqlx with split
//! read/write pools. Values are stored as JSON text and every row is scoped
//! to the store's memory bucket.

use chrono::{DateTime, Utc};
use nebula_core::memory::store::DurableStore;
use nebula_types::error::RepositoryError;
use nebula_types::memory::{DurableEntry, VersionRecord};
use nebula_types::value::MemoryValue;
use sqlx::Row;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `DurableStore` for one memory bucket.
#[derive(Clone)]
pub struct SqliteDurableStore {
    pool: DatabasePool,
    bucket: String,
}

impl SqliteDurableStore {
    pub fn new(pool: DatabasePool, bucket: impl Into<String>) -> Self {
        Self {
            pool,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct EntryRow {
    key: String,
    value: String,
    created_at: String,
    updated_at: String,
}

impl EntryRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            key: row.try_get("key")?,
            value: row.try_get("value")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_entry(self) -> Result<DurableEntry, RepositoryError> {
        Ok(DurableEntry {
            value: decode_value(&self.value)?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            key: self.key,
        })
    }
}

struct VersionRow {
    version: i64,
    value: String,
    note: String,
    created_at: String,
}

impl VersionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            version: row.try_get("version")?,
            value: row.try_get("value")?,
            note: row.try_get("note")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_record(self) -> Result<VersionRecord, RepositoryError> {
        let version = u32::try_from(self.version)
            .map_err(|e| RepositoryError::Query(format!("invalid version {}: {e}", self.version)))?;
        Ok(VersionRecord {
            version,
            timestamp: parse_datetime(&self.created_at)?,
            value: decode_value(&self.value)?,
            note: self.note,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn encode_value(value: &MemoryValue) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|e| RepositoryError::Serialization(format!("failed to serialize value: {e}")))
}

fn decode_value(s: &str) -> Result<MemoryValue, RepositoryError> {
    serde_json::from_str(s)
        .map_err(|e| RepositoryError::Serialization(format!("invalid JSON value: {e}")))
}

fn query_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

// ---------------------------------------------------------------------------
// DurableStore implementation
// ---------------------------------------------------------------------------

impl DurableStore for SqliteDurableStore {
    async fn get(&self, key: &str) -> Result<Option<MemoryValue>, RepositoryError> {
        let row = sqlx::query("SELECT value FROM durable_entries WHERE bucket = ? AND key = ?")
            .bind(&self.bucket)
            .bind(key)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let value_str: String = row.try_get("value").map_err(query_error)?;
                Ok(Some(decode_value(&value_str)?))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &MemoryValue) -> Result<(), RepositoryError> {
        let now = format_datetime(&Utc::now());
        let value_str = encode_value(value)?;

        sqlx::query(
            r#"INSERT INTO durable_entries (bucket, key, value, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (bucket, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at"#,
        )
        .bind(&self.bucket)
        .bind(key)
        .bind(&value_str)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        sqlx::query("DELETE FROM durable_versions WHERE bucket = ? AND key = ?")
            .bind(&self.bucket)
            .bind(key)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;

        sqlx::query("DELETE FROM durable_entries WHERE bucket = ? AND key = ?")
            .bind(&self.bucket)
            .bind(key)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query("SELECT key FROM durable_entries WHERE bucket = ? ORDER BY key")
            .bind(&self.bucket)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        let mut keys = Vec::with_capacity(rows.len());
        for row in &rows {
            let key: String = row.try_get("key").map_err(query_error)?;
            keys.push(key);
        }

        Ok(keys)
    }

    async fn get_entry(&self, key: &str) -> Result<Option<DurableEntry>, RepositoryError> {
        let row = sqlx::query(
            "SELECT key, value, created_at, updated_at FROM durable_entries WHERE bucket = ? AND key = ?",
        )
        .bind(&self.bucket)
        .bind(key)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_error)?;

        match row {
            Some(row) => {
                let entry_row = EntryRow::from_row(&row).map_err(query_error)?;
                Ok(Some(entry_row.into_entry()?))
            }
            None => Ok(None),
        }
    }

    async fn get_history(&self, key: &str) -> Result<Vec<VersionRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT version, value, note, created_at FROM durable_versions WHERE bucket = ? AND key = ? ORDER BY version",
        )
        .bind(&self.bucket)
        .bind(key)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                VersionRow::from_row(row)
                    .map_err(query_error)
                    .and_then(VersionRow::into_record)
            })
            .collect()
    }

    async fn append_version_and_set(
        &self,
        key: &str,
        record: &VersionRecord,
    ) -> Result<(), RepositoryError> {
        let value_str = encode_value(&record.value)?;
        let now = format_datetime(&Utc::now());
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        sqlx::query(
            r#"INSERT INTO durable_entries (bucket, key, value, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (bucket, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at"#,
        )
        .bind(&self.bucket)
        .bind(key)
        .bind(&value_str)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        let result = sqlx::query(
            r#"INSERT INTO durable_versions (bucket, key, version, value, note, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&self.bucket)
        .bind(key)
        .bind(i64::from(record.version))
        .bind(&value_str)
        .bind(&record.note)
        .bind(format_datetime(&record.timestamp))
        .execute(&mut *tx)
        .await;

        // Dropping `tx` on the error paths rolls back the entry upsert.
        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(RepositoryError::Conflict(format!(
                    "version {} already exists for '{key}'",
                    record.version
                )));
            }
            Err(e) => return Err(query_error(e)),
        }

        tx.commit().await.map_err(query_error)?;
        Ok(())
    }
}
