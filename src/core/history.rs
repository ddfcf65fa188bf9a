//! Bounded per-client conversation history
//!
//! Each client id gets an ordered list of the most recent turns, capped at
//! [`HISTORY_LIMIT`] entries with the oldest evicted first. Histories are
//! created lazily and live for the process lifetime unless cleared.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

/// Most recent turns retained per client
pub const HISTORY_LIMIT: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Model,
}

#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

/// Conversation store shared across query pipelines
pub struct ConversationStore {
    inner: Mutex<HashMap<String, VecDeque<ChatTurn>>>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Append a turn, evicting the oldest entries beyond the cap
    pub fn append(&self, client_id: &str, role: ChatRole, content: impl Into<String>) {
        let mut map = self.inner.lock();
        let turns = map.entry(client_id.to_string()).or_default();
        turns.push_back(ChatTurn {
            role,
            content: content.into(),
        });
        while turns.len() > HISTORY_LIMIT {
            turns.pop_front();
        }
    }

    /// Snapshot of the client's history in original order
    pub fn history_of(&self, client_id: &str) -> Vec<ChatTurn> {
        self.inner
            .lock()
            .get(client_id)
            .map(|turns| turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self, client_id: &str) {
        self.inner.lock().remove(client_id);
    }
}
