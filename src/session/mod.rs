use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

const MAX_TRACKED_CHATS: usize = 64;
const MAX_CHAT_TURNS: usize = 20;

/// One conversation turn as the AI provider sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: "model".to_string(),
            content: content.into(),
        }
    }
}

/// In-memory conversation history, per sender. Strictly ephemeral: restarts
/// wipe it, and the least recently active chats fall out once the cache is
/// full. Persisted context would outlive bans and retention expectations.
pub struct ChatMemory {
    chats: Mutex<LruCache<String, Vec<ChatTurn>>>,
}

impl Default for ChatMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatMemory {
    pub fn new() -> Self {
        Self {
            chats: Mutex::new(LruCache::new(
                NonZeroUsize::new(MAX_TRACKED_CHATS).expect("MAX_TRACKED_CHATS must be > 0"),
            )),
        }
    }

    /// Snapshot of the sender's history, oldest first.
    pub fn history(&self, sender: &str) -> Vec<ChatTurn> {
        let mut chats = self.chats.lock().unwrap_or_else(|e| e.into_inner());
        chats.get(sender).cloned().unwrap_or_default()
    }

    /// Append a completed exchange and prune to the rolling window.
    pub fn record(&self, sender: &str, user_text: &str, model_text: &str) {
        let mut chats = self.chats.lock().unwrap_or_else(|e| e.into_inner());
        let history = chats.get_or_insert_mut(sender.to_string(), Vec::new);
        history.push(ChatTurn::user(user_text));
        history.push(ChatTurn::model(model_text));
        if history.len() > MAX_CHAT_TURNS {
            let drain_count = history.len() - MAX_CHAT_TURNS;
            history.drain(..drain_count);
        }
    }
}
