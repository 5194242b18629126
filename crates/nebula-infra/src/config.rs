//! Agent configuration loader for nebula.
//!
//! Reads a TOML file and deserializes it into [`AgentConfig`]. Falls back to
//! defaults when the file is missing or malformed.

use std::path::Path;

use nebula_types::config::AgentConfig;

/// File name looked up inside the data directory.
pub const CONFIG_FILE_NAME: &str = "agent.toml";

/// Load agent configuration from `path`.
///
/// - If the file does not exist, returns [`AgentConfig::default()`].
/// - If the file exists but cannot be read or parsed, logs a warning and returns the default.
/// - Otherwise returns the parsed config; fields absent from the file take their defaults.
pub async fn load_agent_config(path: &Path) -> AgentConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No agent config at {}, using defaults", path.display());
            return AgentConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return AgentConfig::default();
        }
    };

    match toml::from_str::<AgentConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            AgentConfig::default()
        }
    }
}

/// Load `{data_dir}/agent.toml`.
pub async fn load_agent_config_from_dir(data_dir: &Path) -> AgentConfig {
    load_agent_config(&data_dir.join(CONFIG_FILE_NAME)).await
}
