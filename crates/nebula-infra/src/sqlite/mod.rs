//! SQLite storage layer for nebula.
//!
//! Provides the database pool with WAL mode and split read/write connections,
//! and the durable store implementation.

pub mod durable;
pub mod pool;
