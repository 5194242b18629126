//! Core logic for nebula: conversation buffer, durable memory with version
//! history, keyword search, conversation sessions, and streaming chat.
//!
//! Storage and providers are reached only through the traits defined here;
//! concrete backends live in nebula-infra.

pub mod agent;
pub mod chat;
pub mod llm;
pub mod memory;

pub use agent::facade::Agent;
