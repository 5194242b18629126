//! Infrastructure for nebula: the SQLite durable store and config loading.

pub mod config;
pub mod sqlite;

use nebula_core::Agent;
use nebula_core::llm::box_provider::BoxLlmProvider;
use nebula_types::config::AgentConfig;

use sqlite::durable::SqliteDurableStore;
use sqlite::pool::DatabasePool;

/// Open the database at `database_url` and build an initialized agent whose
/// durable memory lives in the config's memory bucket.
pub async fn open_agent(
    config: AgentConfig,
    provider: BoxLlmProvider,
    database_url: &str,
) -> anyhow::Result<Agent<SqliteDurableStore>> {
    let pool = DatabasePool::new(database_url).await?;
    let store = SqliteDurableStore::new(pool, config.memory_bucket.clone());
    let agent = Agent::new(config, provider, store);
    agent.init().await?;
    Ok(agent)
}
