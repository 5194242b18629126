//! Conversation save/load.
//!
//! A saved conversation is a [`SessionSnapshot`] written to durable memory
//! under `conversation::{session_id}`. Loading replaces the ephemeral buffer
//! wholesale; nothing is merged.

use std::sync::Arc;

use chrono::Utc;
use nebula_types::error::AgentError;
use nebula_types::memory::SessionSnapshot;
use nebula_types::value::MemoryValue;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::memory::buffer::EphemeralBuffer;
use crate::memory::store::DurableStore;
use crate::memory::versioned::VersionedStore;

/// Key prefix under which conversation snapshots are stored.
pub const SESSION_KEY_PREFIX: &str = "conversation::";

/// Durable key for a session id.
pub fn session_key(session_id: &str) -> String {
    format!("{SESSION_KEY_PREFIX}{session_id}")
}

/// Moves conversation snapshots between the buffer and durable memory.
pub struct SessionManager<S: DurableStore> {
    store: Arc<VersionedStore<S>>,
    buffer: Arc<RwLock<EphemeralBuffer>>,
}

impl<S: DurableStore> SessionManager<S> {
    pub fn new(store: Arc<VersionedStore<S>>, buffer: Arc<RwLock<EphemeralBuffer>>) -> Self {
        Self { store, buffer }
    }

    /// Persist the current buffer contents. Overwrites any earlier save
    /// under the same id and returns the durable key written.
    pub async fn save(&self, session_id: &str) -> Result<String, AgentError> {
        let messages = self.buffer.read().await.snapshot();
        let snapshot = SessionSnapshot {
            session_id: session_id.to_string(),
            saved_at: Utc::now(),
            messages,
        };

        let value = serde_json::to_value(&snapshot)
            .map_err(|e| AgentError::InvalidSnapshot(e.to_string()))?;
        let key = session_key(session_id);
        self.store.put(&key, &MemoryValue::from(value)).await?;

        info!(
            session_id,
            messages = snapshot.messages.len(),
            "conversation saved"
        );
        Ok(key)
    }

    /// Replace the buffer with a previously saved conversation.
    ///
    /// Fails with `NotFound` if nothing was saved under `session_id`; the
    /// buffer is left untouched in that case. Returns the number of
    /// messages now in the buffer.
    pub async fn load(&self, session_id: &str) -> Result<usize, AgentError> {
        let snapshot = self.read(session_id).await?;

        let mut buffer = self.buffer.write().await;
        buffer.restore(snapshot.messages);
        let restored = buffer.len();

        debug!(session_id, restored, "conversation loaded");
        Ok(restored)
    }

    /// Read a saved snapshot without touching the buffer.
    pub async fn read(&self, session_id: &str) -> Result<SessionSnapshot, AgentError> {
        let key = session_key(session_id);
        let value = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| AgentError::NotFound { key: key.clone() })?;

        serde_json::from_value(serde_json::Value::from(value))
            .map_err(|e| AgentError::InvalidSnapshot(format!("{key}: {e}")))
    }

    /// Ids of every saved conversation, sorted.
    pub async fn list(&self) -> Result<Vec<String>, AgentError> {
        Ok(self
            .store
            .keys()
            .await?
            .into_iter()
            .filter_map(|k| k.strip_prefix(SESSION_KEY_PREFIX).map(str::to_string))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::in_memory::InMemoryStore;
    use nebula_types::message::Message;

    fn manager(capacity: usize) -> (SessionManager<InMemoryStore>, Arc<RwLock<EphemeralBuffer>>) {
        let store = Arc::new(VersionedStore::new(InMemoryStore::new()));
        let buffer = Arc::new(RwLock::new(EphemeralBuffer::new(capacity)));
        (SessionManager::new(store, Arc::clone(&buffer)), buffer)
    }

    #[test]
    fn test_session_key_format() {
        assert_eq!(session_key("basic_demo_session"), "conversation::basic_demo_session");
    }

    #[tokio::test]
    async fn test_save_clear_load_restores_buffer() {
        let (sessions, buffer) = manager(10);
        {
            let mut b = buffer.write().await;
            b.append(Message::user("Hello!"));
            b.append(Message::assistant("Hi, Alice."));
        }
        let before = buffer.read().await.snapshot();

        let key = sessions.save("s1").await.unwrap();
        assert_eq!(key, "conversation::s1");

        buffer.write().await.clear();
        let restored = sessions.load("s1").await.unwrap();

        assert_eq!(restored, 2);
        assert_eq!(buffer.read().await.snapshot(), before);
    }

    #[tokio::test]
    async fn test_load_missing_is_not_found_and_leaves_buffer() {
        let (sessions, buffer) = manager(10);
        buffer.write().await.append(Message::user("keep me"));

        let err = sessions.load("never-saved").await.unwrap_err();
        assert!(matches!(err, AgentError::NotFound { ref key } if key == "conversation::never-saved"));
        assert_eq!(buffer.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_save_twice_overwrites() {
        let (sessions, buffer) = manager(10);
        buffer.write().await.append(Message::user("first"));
        sessions.save("s").await.unwrap();

        buffer.write().await.append(Message::user("second"));
        sessions.save("s").await.unwrap();

        let snapshot = sessions.read("s").await.unwrap();
        assert_eq!(snapshot.messages.len(), 2);
        assert_eq!(sessions.list().await.unwrap(), vec!["s"]);
    }

    #[tokio::test]
    async fn test_load_truncates_to_capacity() {
        let (sessions, buffer) = manager(10);
        {
            let mut b = buffer.write().await;
            for i in 0..6 {
                b.append(Message::user(format!("m{i}")));
            }
        }
        sessions.save("long").await.unwrap();

        let store = Arc::clone(&sessions.store);
        let small = Arc::new(RwLock::new(EphemeralBuffer::new(4)));
        let loader = SessionManager::new(store, Arc::clone(&small));
        assert_eq!(loader.load("long").await.unwrap(), 4);
        assert_eq!(small.read().await.snapshot()[0].content, "m2");
    }

    #[tokio::test]
    async fn test_load_rejects_malformed_snapshot() {
        let (sessions, _) = manager(10);
        sessions
            .store
            .put("conversation::bad", &"not a snapshot".into())
            .await
            .unwrap();
        let err = sessions.load("bad").await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidSnapshot(_)));
    }
}
