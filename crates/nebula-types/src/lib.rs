//! Shared domain types for nebula.
//!
//! This crate contains the data shapes used across the agent memory core:
//! conversation messages, durable memory values and their version history,
//! LLM request/stream types, agent configuration, and error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod message;
pub mod value;
