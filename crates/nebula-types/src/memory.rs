//! Memory types for nebula.
//!
//! These types model what the durable store holds (entries, version history,
//! saved conversation snapshots), what a keyword search returns, and the
//! derived statistics reported by the agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::value::MemoryValue;

/// A key-value entry in the durable store, including timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurableEntry {
    pub key: String,
    pub value: MemoryValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One step in a key's version history.
///
/// Versions start at 1 and increase by exactly 1 per versioned write.
/// Records are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    /// Value as written at this version.
    pub value: MemoryValue,
    /// Free-form description supplied by the writer.
    pub note: String,
}

/// A saved copy of the conversation buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub saved_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

/// A durable key that matched a keyword search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMatch {
    pub key: String,
    pub value: MemoryValue,
    /// Query terms found in the value, in query order.
    pub matched_terms: Vec<String>,
    /// `matched_terms.len() / query_terms.len()`, in `[0, 1]`.
    pub relevance: f64,
}

/// Message counts per role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCounts {
    pub user: usize,
    pub assistant: usize,
    pub system: usize,
}

/// Aggregate view of the ephemeral buffer at query time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferStats {
    pub total: usize,
    pub by_role: RoleCounts,
    /// Mean content length in characters; 0 when the buffer is empty.
    pub average_length: f64,
}

/// Memory section of [`AgentStats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub ephemeral_messages: usize,
    pub ephemeral_data: usize,
    pub max_ephemeral_messages: usize,
    pub messages_by_role: RoleCounts,
    pub average_message_length: f64,
    pub durable_keys: usize,
}

/// Chat section of [`AgentStats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatStats {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Read-only snapshot returned by `Agent::get_stats`. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStats {
    pub name: String,
    pub memory: MemoryStats,
    pub chat: ChatStats,
}
