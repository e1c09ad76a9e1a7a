//! Per-session conversation memory
//!
//! Keeps the last few user/assistant pairs for each session so follow-up
//! questions reach the model with their context. Append and trim happen in
//! one critical section, so concurrent requests on the same session never
//! lose a turn or over-trim.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::llm::{ChatMessage, Role};

/// Configuration for the memory system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// User/assistant pairs retained per session.
    pub max_pairs: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { max_pairs: 3 }
    }
}

/// Memory statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub sessions: usize,
    pub messages: usize,
}

pub struct ConversationMemory {
    max_pairs: usize,
    sessions: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl ConversationMemory {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            max_pairs: config.max_pairs.max(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot of a session's retained messages, oldest first.
    pub fn history(&self, session_id: &str) -> Vec<ChatMessage> {
        self.sessions
            .lock()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Append one exchange and drop the oldest pairs beyond the limit.
    pub fn record(&self, session_id: &str, query: &str, response: &str) {
        let mut sessions = self.sessions.lock();
        let history = sessions.entry(session_id.to_string()).or_default();
        history.push(ChatMessage::new(Role::User, query));
        history.push(ChatMessage::new(Role::Assistant, response));

        let limit = self.max_pairs * 2;
        if history.len() > limit {
            let excess = history.len() - limit;
            history.drain(..excess);
        }
    }

    pub fn clear(&self, session_id: &str) -> bool {
        self.sessions.lock().remove(session_id).is_some()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn stats(&self) -> MemoryStats {
        let sessions = self.sessions.lock();
        MemoryStats {
            sessions: sessions.len(),
            messages: sessions.values().map(Vec::len).sum(),
        }
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(&MemoryConfig::default())
    }
}
