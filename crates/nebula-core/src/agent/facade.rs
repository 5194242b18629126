//! The agent: one explicit context object owning a conversation buffer,
//! durable memory, and a model provider.
//!
//! Every public operation takes `&self`, so an `Agent` can be shared behind
//! an `Arc` across tasks. The buffer sits behind an async `RwLock`; a turn
//! (user prompt plus assistant reply) is committed under a single write
//! guard, and only after the model call succeeds.

use std::sync::Arc;
use std::time::Duration;

use nebula_types::config::AgentConfig;
use nebula_types::error::AgentError;
use nebula_types::llm::CompletionRequest;
use nebula_types::memory::{AgentStats, ChatStats, MemoryStats, SearchMatch, VersionRecord};
use nebula_types::message::Message;
use nebula_types::value::MemoryValue;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chat::session::{SESSION_KEY_PREFIX, SessionManager};
use crate::chat::streaming::{StreamReport, StreamingCoordinator};
use crate::llm::box_provider::BoxLlmProvider;
use crate::memory::buffer::EphemeralBuffer;
use crate::memory::scratchpad::Scratchpad;
use crate::memory::search::KeywordQuery;
use crate::memory::store::DurableStore;
use crate::memory::versioned::VersionedStore;

use super::engine::AgentEngine;

/// Prefix for keys the agent keeps for itself.
pub const AGENT_KEY_PREFIX: &str = "agent::";

/// Durable key under which `save_system_prompt` persists the prompt.
pub const SYSTEM_PROMPT_KEY: &str = "agent::system_prompt";

/// Whether `key` belongs to the agent's own namespaces (saved system prompt,
/// conversation snapshots). Caller writes to these keys are rejected.
pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with(AGENT_KEY_PREFIX) || key.starts_with(SESSION_KEY_PREFIX)
}

fn check_writable(key: &str) -> Result<(), AgentError> {
    if is_reserved_key(key) {
        return Err(AgentError::ReservedKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

/// A conversational agent with ephemeral and durable memory.
pub struct Agent<S: DurableStore> {
    config: AgentConfig,
    engine: AgentEngine,
    store: Arc<VersionedStore<S>>,
    buffer: Arc<RwLock<EphemeralBuffer>>,
    sessions: SessionManager<S>,
    scratchpad: Scratchpad,
    system_prompt: RwLock<Option<String>>,
}

impl<S: DurableStore> Agent<S> {
    pub fn new(config: AgentConfig, provider: BoxLlmProvider, store: S) -> Self {
        let store = Arc::new(VersionedStore::new(store));
        let buffer = Arc::new(RwLock::new(EphemeralBuffer::new(config.buffer_capacity())));
        let sessions = SessionManager::new(Arc::clone(&store), Arc::clone(&buffer));
        let system_prompt = RwLock::new(config.system_prompt.clone());

        Self {
            engine: AgentEngine::new(provider),
            config,
            store,
            buffer,
            sessions,
            scratchpad: Scratchpad::new(),
            system_prompt,
        }
    }

    /// Restore a saved system prompt when the config did not supply one.
    pub async fn init(&self) -> Result<(), AgentError> {
        if self.system_prompt.read().await.is_none() {
            // Storage is read without holding the prompt lock.
            let saved = self.store.get(SYSTEM_PROMPT_KEY).await?;
            match saved {
                Some(MemoryValue::Text(text)) => {
                    let mut prompt = self.system_prompt.write().await;
                    // A prompt set while the read was in flight wins.
                    if prompt.is_none() {
                        *prompt = Some(text);
                    }
                }
                Some(other) => {
                    warn!(kind = other.kind(), "ignoring non-text saved system prompt")
                }
                None => {}
            }
        }

        let has_system_prompt = self.system_prompt.read().await.is_some();
        info!(
            name = %self.config.name,
            bucket = %self.config.memory_bucket,
            provider = self.engine.provider_name(),
            has_system_prompt,
            "agent initialized"
        );
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    // --- durable memory ---

    /// Unconditional durable write.
    ///
    /// Keys under `agent::` or `conversation::` are rejected with
    /// `ReservedKey`; see [`is_reserved_key`].
    pub async fn remember(
        &self,
        key: &str,
        value: impl Into<MemoryValue>,
    ) -> Result<(), AgentError> {
        check_writable(key)?;
        self.store.put(key, &value.into()).await?;
        debug!(key, "remembered");
        Ok(())
    }

    /// Durable read. `None` when the key was never written.
    pub async fn recall(&self, key: &str) -> Result<Option<MemoryValue>, AgentError> {
        Ok(self.store.get(key).await?)
    }

    /// Remove a durable key and its history. No-op if absent.
    ///
    /// Reserved keys are allowed here, so this also deletes a saved
    /// conversation or system prompt.
    pub async fn forget(&self, key: &str) -> Result<(), AgentError> {
        self.store.delete(key).await?;
        Ok(())
    }

    /// Versioned durable write. Returns the new version number.
    pub async fn remember_versioned(
        &self,
        key: &str,
        value: impl Into<MemoryValue>,
        note: &str,
    ) -> Result<u32, AgentError> {
        check_writable(key)?;
        Ok(self.store.put_versioned(key, &value.into(), note).await?)
    }

    /// Version history for `key`, oldest first.
    pub async fn history(&self, key: &str) -> Result<Vec<VersionRecord>, AgentError> {
        Ok(self.store.get_history(key).await?)
    }

    /// Keyword search over `keys`, results in `keys` order.
    pub async fn search_memory<T, K>(
        &self,
        terms: &[T],
        keys: &[K],
    ) -> Result<Vec<SearchMatch>, AgentError>
    where
        T: AsRef<str>,
        K: AsRef<str>,
    {
        let query = KeywordQuery::new(terms);
        Ok(query.search(&self.store, keys).await?)
    }

    // --- ephemeral data ---

    pub fn set_ephemeral(&self, key: impl Into<String>, value: impl Into<MemoryValue>) {
        self.scratchpad.set(key, value);
    }

    pub fn get_ephemeral(&self, key: &str) -> Option<MemoryValue> {
        self.scratchpad.get(key)
    }

    pub fn remove_ephemeral(&self, key: &str) -> Option<MemoryValue> {
        self.scratchpad.remove(key)
    }

    // --- system prompt ---

    pub async fn set_system_prompt(&self, prompt: impl Into<String>) {
        *self.system_prompt.write().await = Some(prompt.into());
    }

    pub async fn system_prompt(&self) -> Option<String> {
        self.system_prompt.read().await.clone()
    }

    /// Persist the current system prompt. Fails with `NotFound` if none is set.
    pub async fn save_system_prompt(&self) -> Result<(), AgentError> {
        let prompt = self
            .system_prompt()
            .await
            .ok_or_else(|| AgentError::NotFound {
                key: SYSTEM_PROMPT_KEY.to_string(),
            })?;
        self.store
            .put(SYSTEM_PROMPT_KEY, &MemoryValue::Text(prompt))
            .await?;
        Ok(())
    }

    // --- conversation ---

    /// Send `prompt` with the current conversation and return the full reply.
    pub async fn chat_with_context(&self, prompt: &str) -> Result<String, AgentError> {
        let request = self.prepare_request(prompt, false).await;
        let response = self.engine.execute_non_streaming(&request).await?;

        self.commit_turn(prompt, &response.content).await;
        Ok(response.content)
    }

    /// Stream a reply, forwarding each chunk to `on_chunk`, and return the
    /// full text once the stream completes.
    ///
    /// Handler faults are logged and skipped. Bounded by
    /// `stream_timeout_secs` when configured.
    pub async fn stream_chat<F>(&self, prompt: &str, on_chunk: F) -> Result<String, AgentError>
    where
        F: FnMut(&str) -> anyhow::Result<()>,
    {
        let report = self
            .stream_chat_with_cancel(prompt, on_chunk, &CancellationToken::new())
            .await?;
        Ok(report.text)
    }

    /// Like [`stream_chat`](Self::stream_chat), but stops when `cancel` fires
    /// and returns the full report including any handler faults.
    ///
    /// On failure, timeout, or cancellation nothing is committed to the
    /// buffer.
    pub async fn stream_chat_with_cancel<F>(
        &self,
        prompt: &str,
        on_chunk: F,
        cancel: &CancellationToken,
    ) -> Result<StreamReport, AgentError>
    where
        F: FnMut(&str) -> anyhow::Result<()>,
    {
        let request = self.prepare_request(prompt, true).await;

        let mut coordinator = StreamingCoordinator::new();
        coordinator.begin();
        let stream = self.engine.execute(request);
        let drive = coordinator.drive(stream, on_chunk, cancel);

        let report = match self.config.stream_timeout_secs {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), drive)
                .await
                .map_err(|_| {
                    warn!(secs, "streaming call timed out");
                    AgentError::TimedOut { secs }
                })??,
            None => drive.await?,
        };

        self.commit_turn(prompt, &report.text).await;
        Ok(report)
    }

    /// Persist the buffer under `session_id`; returns the durable key.
    pub async fn save_conversation(&self, session_id: &str) -> Result<String, AgentError> {
        self.sessions.save(session_id).await
    }

    /// Replace the buffer with a saved conversation. Returns the number of
    /// messages restored.
    pub async fn load_conversation(&self, session_id: &str) -> Result<usize, AgentError> {
        self.sessions.load(session_id).await
    }

    /// Ids of all saved conversations.
    pub async fn saved_conversations(&self) -> Result<Vec<String>, AgentError> {
        self.sessions.list().await
    }

    pub async fn clear_conversation(&self) {
        self.buffer.write().await.clear();
    }

    /// Snapshot of the conversation buffer.
    pub async fn messages(&self) -> Vec<Message> {
        self.buffer.read().await.snapshot()
    }

    /// Read-only aggregate of agent state.
    pub async fn get_stats(&self) -> Result<AgentStats, AgentError> {
        let buffer_stats = self.buffer.read().await.stats();
        let durable_keys = self.store.keys().await?.len();

        Ok(AgentStats {
            name: self.config.name.clone(),
            memory: MemoryStats {
                ephemeral_messages: buffer_stats.total,
                ephemeral_data: self.scratchpad.len(),
                max_ephemeral_messages: self.config.buffer_capacity(),
                messages_by_role: buffer_stats.by_role,
                average_message_length: buffer_stats.average_length,
                durable_keys,
            },
            chat: ChatStats {
                model: self.config.model.clone(),
                temperature: self.config.temperature,
                max_tokens: self.config.max_tokens,
            },
        })
    }

    async fn prepare_request(&self, prompt: &str, stream: bool) -> CompletionRequest {
        let history = self.buffer.read().await.snapshot();
        let system = self.system_prompt().await;
        AgentEngine::build_request(&self.config, system, history, prompt, stream)
    }

    async fn commit_turn(&self, prompt: &str, reply: &str) {
        let mut buffer = self.buffer.write().await;
        buffer.append(Message::user(prompt));
        buffer.append(Message::assistant(reply));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::{ScriptEnding, ScriptedProvider};
    use crate::memory::in_memory::InMemoryStore;
    use nebula_types::error::RepositoryError;
    use nebula_types::memory::DurableEntry;
    use nebula_types::message::MessageRole;
    use serde_json::json;
    use tokio::sync::Notify;

    /// `InMemoryStore` whose reads of the saved system prompt park until
    /// `release` is notified.
    #[derive(Clone, Default)]
    struct GatedStore {
        inner: InMemoryStore,
        reached: Arc<Notify>,
        release: Arc<Notify>,
    }

    impl DurableStore for GatedStore {
        async fn get(&self, key: &str) -> Result<Option<MemoryValue>, RepositoryError> {
            if key == SYSTEM_PROMPT_KEY {
                self.reached.notify_one();
                self.release.notified().await;
            }
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &MemoryValue) -> Result<(), RepositoryError> {
            self.inner.set(key, value).await
        }

        async fn delete(&self, key: &str) -> Result<(), RepositoryError> {
            self.inner.delete(key).await
        }

        async fn list_keys(&self) -> Result<Vec<String>, RepositoryError> {
            self.inner.list_keys().await
        }

        async fn get_entry(&self, key: &str) -> Result<Option<DurableEntry>, RepositoryError> {
            self.inner.get_entry(key).await
        }

        async fn get_history(&self, key: &str) -> Result<Vec<VersionRecord>, RepositoryError> {
            self.inner.get_history(key).await
        }

        async fn append_version_and_set(
            &self,
            key: &str,
            record: &VersionRecord,
        ) -> Result<(), RepositoryError> {
            self.inner.append_version_and_set(key, record).await
        }
    }

    fn agent_with(provider: ScriptedProvider, config: AgentConfig) -> Agent<InMemoryStore> {
        Agent::new(config, BoxLlmProvider::new(provider), InMemoryStore::new())
    }

    fn agent(provider: ScriptedProvider) -> Agent<InMemoryStore> {
        agent_with(provider, AgentConfig::default())
    }

    #[tokio::test]
    async fn test_remember_recall_forget() {
        let agent = agent(ScriptedProvider::replying("ok"));
        agent.remember("user_name", "Alice").await.unwrap();
        agent
            .remember("preferences", json!({"language": "English", "style": "casual"}))
            .await
            .unwrap();

        assert_eq!(
            agent.recall("user_name").await.unwrap(),
            Some(MemoryValue::from("Alice"))
        );
        assert_eq!(agent.recall("missing").await.unwrap(), None);

        agent.forget("user_name").await.unwrap();
        assert_eq!(agent.recall("user_name").await.unwrap(), None);
        agent.forget("user_name").await.unwrap();
    }

    #[tokio::test]
    async fn test_remember_versioned_and_history() {
        let agent = agent(ScriptedProvider::replying("ok"));
        for (i, phase) in ["planning", "development", "testing"].iter().enumerate() {
            let version = agent
                .remember_versioned("project_status", json!({"phase": phase}), phase)
                .await
                .unwrap();
            assert_eq!(version, i as u32 + 1);
        }

        let history = agent.history("project_status").await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].value, MemoryValue::from(json!({"phase": "testing"})));
        assert_eq!(
            agent.recall("project_status").await.unwrap(),
            Some(MemoryValue::from(json!({"phase": "testing"})))
        );
    }

    #[tokio::test]
    async fn test_search_memory_single_term() {
        let agent = agent(ScriptedProvider::replying("ok"));
        agent
            .remember("user_profile", json!({"name": "Alice", "role": "engineer"}))
            .await
            .unwrap();
        agent
            .remember(
                "research_notes",
                json!({"topics": ["robotics", "control theory"]}),
            )
            .await
            .unwrap();

        let matches = agent
            .search_memory(&["robotics"], &["user_profile", "research_notes"])
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].key, "research_notes");
        assert_eq!(matches[0].relevance, 1.0);
    }

    #[tokio::test]
    async fn test_chat_with_context_commits_turn_and_sends_history() {
        let provider = ScriptedProvider::replying("Nice to meet you, Alice!");
        let agent = agent(provider.clone());

        let reply = agent.chat_with_context("Hi, I'm Alice.").await.unwrap();
        assert_eq!(reply, "Nice to meet you, Alice!");

        agent.chat_with_context("What's my name?").await.unwrap();

        let messages = agent.messages().await;
        let roles: Vec<MessageRole> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User,
                MessageRole::Assistant
            ]
        );

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].messages.len(), 1);
        let second: Vec<&str> = requests[1].messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            second,
            vec!["Hi, I'm Alice.", "Nice to meet you, Alice!", "What's my name?"]
        );
        assert!(!requests[1].stream);
    }

    #[tokio::test]
    async fn test_chat_provider_fault_leaves_buffer_unchanged() {
        let provider = ScriptedProvider::replying("unused")
            .with_ending(ScriptEnding::Fault("upstream 500".into()));
        let agent = agent(provider);

        let err = agent.chat_with_context("hello").await.unwrap_err();
        assert!(err.is_provider_fault());
        assert!(agent.messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_stream_chat_handler_failing_every_third_chunk() {
        let chunks: Vec<String> = (0..10).map(|i| format!("part{i} ")).collect();
        let agent = agent(ScriptedProvider::new(chunks.clone()));
        let mut count = 0;

        let full = agent
            .stream_chat("Tell me a story", |_| {
                count += 1;
                if count % 3 == 0 {
                    anyhow::bail!("terminal closed");
                }
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(full, chunks.concat());
        let assistant: Vec<Message> = agent
            .messages()
            .await
            .into_iter()
            .filter(|m| m.role == MessageRole::Assistant)
            .collect();
        assert_eq!(assistant.len(), 1);
        assert_eq!(assistant[0].content, full);
    }

    #[tokio::test]
    async fn test_stream_chat_provider_fault_after_two_chunks() {
        let provider = ScriptedProvider::new(["one ", "two "])
            .with_ending(ScriptEnding::Fault("connection dropped".into()));
        let agent = agent(provider);

        let mut seen = Vec::new();
        let err = agent
            .stream_chat("Count to five", |c| {
                seen.push(c.to_string());
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(err.is_provider_fault());
        assert_eq!(seen, vec!["one ", "two "]);
        assert!(agent.messages().await.is_empty());
        assert_eq!(agent.get_stats().await.unwrap().memory.durable_keys, 0);
    }

    #[tokio::test]
    async fn test_stream_chat_timeout_commits_nothing() {
        let provider = ScriptedProvider::new(["slow"]).with_ending(ScriptEnding::Hang);
        let config = AgentConfig {
            stream_timeout_secs: Some(1),
            ..Default::default()
        };
        let agent = agent_with(provider.clone(), config);

        let err = agent.stream_chat("hello", |_| Ok(())).await.unwrap_err();

        assert!(matches!(err, AgentError::TimedOut { secs: 1 }));
        assert!(agent.messages().await.is_empty());
        assert_eq!(provider.open_streams(), 0);
    }

    #[tokio::test]
    async fn test_stream_chat_cancelled_before_start() {
        let agent = agent(ScriptedProvider::replying("never seen"));
        let token = CancellationToken::new();
        token.cancel();

        let err = agent
            .stream_chat_with_cancel("hello", |_| Ok(()), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert!(agent.messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_buffer_evicts_oldest_turns() {
        let config = AgentConfig {
            max_ephemeral_messages: 3,
            ..Default::default()
        };
        let agent = agent_with(ScriptedProvider::replying("ack"), config);

        agent.chat_with_context("first").await.unwrap();
        agent.chat_with_context("second").await.unwrap();

        let contents: Vec<String> = agent.messages().await.into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["ack", "second", "ack"]);
    }

    #[tokio::test]
    async fn test_save_clear_load_conversation() {
        let agent = agent(ScriptedProvider::replying("Hello Alice"));
        agent.chat_with_context("Hi").await.unwrap();
        let before = agent.messages().await;

        let key = agent.save_conversation("s1").await.unwrap();
        assert_eq!(key, "conversation::s1");

        agent.clear_conversation().await;
        assert!(agent.messages().await.is_empty());

        assert_eq!(agent.load_conversation("s1").await.unwrap(), 2);
        assert_eq!(agent.messages().await, before);
        assert_eq!(agent.saved_conversations().await.unwrap(), vec!["s1"]);
    }

    #[tokio::test]
    async fn test_load_missing_conversation_is_not_found() {
        let agent = agent(ScriptedProvider::replying("x"));
        agent.chat_with_context("keep").await.unwrap();

        let err = agent.load_conversation("nope").await.unwrap_err();
        assert!(matches!(err, AgentError::NotFound { .. }));
        assert!(!err.is_provider_fault());
        assert_eq!(agent.messages().await.len(), 2);
    }

    #[tokio::test]
    async fn test_system_prompt_sent_and_restored() {
        let provider = ScriptedProvider::replying("ok");
        let store = InMemoryStore::new();

        let first = Agent::new(
            AgentConfig::default(),
            BoxLlmProvider::new(provider.clone()),
            store.clone(),
        );
        first.set_system_prompt("You are a memory expert.").await;
        first.save_system_prompt().await.unwrap();
        first.chat_with_context("hi").await.unwrap();
        assert_eq!(
            provider.requests()[0].system.as_deref(),
            Some("You are a memory expert.")
        );
        // Never stored as a buffer message.
        assert!(first.messages().await.iter().all(|m| m.role != MessageRole::System));

        let second = Agent::new(AgentConfig::default(), BoxLlmProvider::new(provider), store);
        assert!(second.system_prompt().await.is_none());
        second.init().await.unwrap();
        assert_eq!(
            second.system_prompt().await.as_deref(),
            Some("You are a memory expert.")
        );
    }

    #[tokio::test]
    async fn test_init_does_not_hold_prompt_lock_during_storage_read() {
        let store = GatedStore::default();
        store
            .inner
            .set(SYSTEM_PROMPT_KEY, &"Saved prompt".into())
            .await
            .unwrap();
        let agent = Arc::new(Agent::new(
            AgentConfig::default(),
            BoxLlmProvider::new(ScriptedProvider::replying("ok")),
            store.clone(),
        ));

        let init = tokio::spawn({
            let agent = Arc::clone(&agent);
            async move { agent.init().await }
        });
        store.reached.notified().await;

        // init is parked inside the store read; the prompt stays readable.
        let prompt = tokio::time::timeout(Duration::from_secs(1), agent.system_prompt())
            .await
            .unwrap();
        assert!(prompt.is_none());

        store.release.notify_one();
        init.await.unwrap().unwrap();
        assert_eq!(agent.system_prompt().await.as_deref(), Some("Saved prompt"));
    }

    #[tokio::test]
    async fn test_prompt_set_during_init_is_kept() {
        let store = GatedStore::default();
        store
            .inner
            .set(SYSTEM_PROMPT_KEY, &"Saved prompt".into())
            .await
            .unwrap();
        let agent = Arc::new(Agent::new(
            AgentConfig::default(),
            BoxLlmProvider::new(ScriptedProvider::replying("ok")),
            store.clone(),
        ));

        let init = tokio::spawn({
            let agent = Arc::clone(&agent);
            async move { agent.init().await }
        });
        store.reached.notified().await;
        agent.set_system_prompt("Fresh prompt").await;

        store.release.notify_one();
        init.await.unwrap().unwrap();
        assert_eq!(agent.system_prompt().await.as_deref(), Some("Fresh prompt"));
    }

    #[tokio::test]
    async fn test_reserved_keys_rejected_for_writes() {
        let agent = agent(ScriptedProvider::replying("Hello Alice"));
        agent.chat_with_context("Hi").await.unwrap();
        agent.save_conversation("s1").await.unwrap();

        let err = agent
            .remember("conversation::s1", "overwrite")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ReservedKey { ref key } if key == "conversation::s1"));

        let err = agent
            .remember_versioned(SYSTEM_PROMPT_KEY, "sneaky", "note")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ReservedKey { .. }));
        assert!(agent.history(SYSTEM_PROMPT_KEY).await.unwrap().is_empty());

        // The saved conversation is intact.
        agent.clear_conversation().await;
        assert_eq!(agent.load_conversation("s1").await.unwrap(), 2);

        // Similar-looking keys outside the namespaces are fine.
        agent.remember("conversation_notes", "ok").await.unwrap();
        assert!(is_reserved_key("agent::anything"));
        assert!(!is_reserved_key("agents"));
    }

    #[tokio::test]
    async fn test_save_system_prompt_without_prompt() {
        let agent = agent(ScriptedProvider::replying("x"));
        let err = agent.save_system_prompt().await.unwrap_err();
        assert!(matches!(err, AgentError::NotFound { ref key } if key == SYSTEM_PROMPT_KEY));
    }

    #[tokio::test]
    async fn test_get_stats() {
        let config = AgentConfig {
            name: "Memory Expert".to_string(),
            max_ephemeral_messages: 100,
            max_tokens: 2000,
            ..Default::default()
        };
        let agent = agent_with(ScriptedProvider::replying("12345678"), config);
        agent.remember("a", 1).await.unwrap();
        agent.remember("b", 2).await.unwrap();
        agent.set_ephemeral("draft", "wip");
        agent.chat_with_context("1234").await.unwrap();

        let stats = agent.get_stats().await.unwrap();
        assert_eq!(stats.name, "Memory Expert");
        assert_eq!(stats.memory.ephemeral_messages, 2);
        assert_eq!(stats.memory.ephemeral_data, 1);
        assert_eq!(stats.memory.max_ephemeral_messages, 100);
        assert_eq!(stats.memory.durable_keys, 2);
        assert_eq!(stats.memory.messages_by_role.user, 1);
        assert!((stats.memory.average_message_length - 6.0).abs() < f64::EPSILON);
        assert_eq!(stats.chat.max_tokens, 2000);

        assert_eq!(agent.remove_ephemeral("draft"), Some(MemoryValue::from("wip")));
        assert_eq!(agent.get_ephemeral("draft"), None);
    }

    #[tokio::test]
    async fn test_concurrent_streams_commit_whole_turns() {
        let agent = Arc::new(agent(ScriptedProvider::replying("same reply here")));
        let mut handles = Vec::new();
        for i in 0..8 {
            let agent = Arc::clone(&agent);
            handles.push(tokio::spawn(async move {
                agent
                    .stream_chat(&format!("prompt {i}"), |_| Ok(()))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), "same reply here");
        }

        let messages = agent.messages().await;
        assert_eq!(messages.len(), 16);
        for pair in messages.chunks(2) {
            assert_eq!(pair[0].role, MessageRole::User);
            assert_eq!(pair[1].role, MessageRole::Assistant);
        }
    }
}
