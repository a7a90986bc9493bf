//! Session store
//!
//! Short-lived per-conversation state: who is talking, where the current
//! flow stands, and the model-facing message history. Keyed by conversation
//! id; entries live for the duration of a conversation and are dropped when
//! it is cleared.

use crate::models::{ChatMessage, ChatRole, IntentLabel};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Per-conversation state.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub restaurant_id: Option<i64>,
    pub is_new_user: bool,

    // Conversation state
    pub messages: Vec<ChatMessage>,
    pub last_intent: Option<IntentLabel>,

    // Flow state
    pub current_report_id: Option<Uuid>,
    pub current_invoice_id: Option<Uuid>,
}

impl Session {
    /// Replace the system message, keeping the rest of the history.
    pub fn set_system_message(&mut self, content: String) {
        self.messages.retain(|m| m.role != ChatRole::System);
        self.messages.insert(0, ChatMessage::system(content));
    }

    /// Clear conversation and flow state but keep the user identity.
    pub fn clear_conversation(&mut self) {
        self.messages.clear();
        self.last_intent = None;
        self.current_report_id = None;
        self.current_invoice_id = None;
    }
}

/// Session store keyed by conversation id.
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Snapshot of a session, creating an empty one if absent.
    pub async fn get_or_create(&self, conversation_id: &str) -> Session {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(conversation_id) {
                return session.clone();
            }
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(conversation_id.to_string())
            .or_default()
            .clone()
    }

    /// Mutate a session in place under the write lock.
    pub async fn update<F, R>(&self, conversation_id: &str, f: F) -> R
    where
        F: FnOnce(&mut Session) -> R,
    {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(conversation_id.to_string()).or_default();
        f(session)
    }

    /// Drop a conversation's state entirely.
    pub async fn remove(&self, conversation_id: &str) {
        self.sessions.write().await.remove(conversation_id);
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_returns_same_state() {
        let store = SessionStore::new();
        store
            .update("chat-1", |s| {
                s.restaurant_id = Some(42);
                s.is_new_user = false;
            })
            .await;

        let session = store.get_or_create("chat-1").await;
        assert_eq!(session.restaurant_id, Some(42));

        let fresh = store.get_or_create("chat-2").await;
        assert_eq!(fresh.restaurant_id, None);
    }

    #[tokio::test]
    async fn test_system_message_replaced_not_duplicated() {
        let store = SessionStore::new();
        store
            .update("chat-1", |s| {
                s.set_system_message("v1".to_string());
                s.messages.push(ChatMessage::user("oi"));
                s.set_system_message("v2".to_string());
            })
            .await;

        let session = store.get_or_create("chat-1").await;
        let system_count = session
            .messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .count();
        assert_eq!(system_count, 1);
        assert_eq!(session.messages[0].content, "v2");
        assert_eq!(session.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_clear_keeps_identity() {
        let store = SessionStore::new();
        store
            .update("chat-1", |s| {
                s.restaurant_id = Some(7);
                s.current_report_id = Some(Uuid::new_v4());
                s.messages.push(ChatMessage::user("oi"));
                s.clear_conversation();
            })
            .await;

        let session = store.get_or_create("chat-1").await;
        assert_eq!(session.restaurant_id, Some(7));
        assert!(session.current_report_id.is_none());
        assert!(session.messages.is_empty());
    }
}
