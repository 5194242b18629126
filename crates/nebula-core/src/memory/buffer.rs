//! Ephemeral conversation buffer.
//!
//! A fixed-capacity FIFO log of conversation turns. Appending past capacity
//! evicts the oldest turn; restoring from a snapshot keeps only the most
//! recent `capacity` turns.

use std::collections::VecDeque;

use nebula_types::memory::{BufferStats, RoleCounts};
use nebula_types::message::{Message, MessageRole};

/// Bounded in-memory conversation history.
///
/// Not synchronized on its own; the agent keeps it behind a `RwLock` so that
/// a snapshot never observes a partial append.
#[derive(Debug, Clone)]
pub struct EphemeralBuffer {
    messages: VecDeque<Message>,
    capacity: usize,
}

impl EphemeralBuffer {
    /// Create an empty buffer. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a message, evicting from the front until `len <= capacity`.
    pub fn append(&mut self, message: Message) {
        self.messages.push_back(message);
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
    }

    /// Ordered copy of the current contents.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    /// Replace the contents with `messages`, keeping the most recent
    /// `capacity` entries when the input is longer.
    pub fn restore(&mut self, messages: Vec<Message>) {
        let skip = messages.len().saturating_sub(self.capacity);
        self.messages = messages.into_iter().skip(skip).collect();
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Message counts and average content length (in characters).
    pub fn stats(&self) -> BufferStats {
        let mut by_role = RoleCounts::default();
        let mut total_chars = 0usize;

        for message in &self.messages {
            match message.role {
                MessageRole::User => by_role.user += 1,
                MessageRole::Assistant => by_role.assistant += 1,
                MessageRole::System => by_role.system += 1,
            }
            total_chars += message.content.chars().count();
        }

        let total = self.messages.len();
        let average_length = if total == 0 {
            0.0
        } else {
            total_chars as f64 / total as f64
        };

        BufferStats {
            total,
            by_role,
            average_length,
        }
    }
}
