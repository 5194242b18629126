//! Conversation persistence and streaming response handling.

pub mod session;
pub mod streaming;
