//! Agent execution for nebula.
//!
//! - `AgentEngine`: builds requests and sends them through the LLM provider
//! - `Agent`: the public facade composing buffer, durable memory, sessions and streaming

pub mod engine;
pub mod facade;
