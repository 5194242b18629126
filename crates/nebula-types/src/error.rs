use thiserror::Error;

use crate::llm::LlmError;

/// Errors from durable store operations (used by trait definitions in nebula-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("query error: {0}")]
    Query(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Errors surfaced by the agent facade.
///
/// Chunk-handler faults are deliberately absent: they are isolated inside
/// the streaming call and reported alongside the result, never as a failure.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("'{key}' not found")]
    NotFound { key: String },

    #[error(transparent)]
    Provider(#[from] LlmError),

    #[error("streaming call cancelled")]
    Cancelled,

    #[error("streaming call timed out after {secs}s")]
    TimedOut { secs: u64 },

    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),

    #[error("invalid conversation snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("'{key}' is in a reserved namespace")]
    ReservedKey { key: String },
}

impl AgentError {
    /// Whether this error came from the model collaborator.
    pub fn is_provider_fault(&self) -> bool {
        matches!(self, AgentError::Provider(_))
    }
}
