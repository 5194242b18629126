//! Agent configuration types for nebula.
//!
//! `AgentConfig` bundles the identity, memory, and LLM settings needed to run
//! an agent. It is loadable from TOML; every field has a default.

use serde::{Deserialize, Serialize};

/// Configuration for a single agent instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Display name reported in stats.
    #[serde(default = "default_name")]
    pub name: String,

    /// Model identifier passed through to the provider.
    #[serde(default = "default_model")]
    pub model: String,

    /// Namespace for this agent's durable memory.
    #[serde(default = "default_memory_bucket")]
    pub memory_bucket: String,

    /// Capacity of the ephemeral conversation buffer.
    #[serde(default = "default_max_ephemeral_messages")]
    pub max_ephemeral_messages: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Initial system prompt. When absent, a previously saved prompt is
    /// restored from durable memory on init.
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Upper bound on a single streaming call, in seconds.
    #[serde(default)]
    pub stream_timeout_secs: Option<u64>,
}

fn default_name() -> String {
    "Assistant".to_string()
}

fn default_model() -> String {
    "llama-3.3-70b-instruct".to_string()
}

fn default_memory_bucket() -> String {
    "default".to_string()
}

fn default_max_ephemeral_messages() -> usize {
    50
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            model: default_model(),
            memory_bucket: default_memory_bucket(),
            max_ephemeral_messages: default_max_ephemeral_messages(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system_prompt: None,
            stream_timeout_secs: None,
        }
    }
}

impl AgentConfig {
    /// Buffer capacity with a floor of one message.
    pub fn buffer_capacity(&self) -> usize {
        self.max_ephemeral_messages.max(1)
    }
}
