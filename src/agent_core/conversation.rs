//! ConversationManager: persistent chat history behind the `ConversationStore`
//! interface.
//!
//! Responsibilities:
//! - Allocate conversation and message ids (UUIDv4) and timestamps
//! - Store and retrieve conversations with their messages (SQLite)
//! - Keep `message_count` / `last_interacted` consistent on every write

use chrono::{Duration, SecondsFormat, Utc};

use super::database::AgentDatabase;
use super::errors::AgentError;
use super::types::{
    Conversation, ConversationDetail, ConversationStats, NewMessage,
};

/// Title given to conversations created without one.
pub const DEFAULT_TITLE: &str = "New Chat";

/// Persistent conversation history.
///
/// The gateway treats the store as a best-effort collaborator: failures are
/// logged and reported to the caller, never allowed to affect a proxy call.
pub trait ConversationStore: Send {
    /// Create a conversation and return its id.
    fn create_conversation(&mut self, title: Option<&str>) -> Result<String, AgentError>;

    /// Append a message. Returns `false` when the conversation does not exist.
    fn add_message(&mut self, conversation_id: &str, msg: NewMessage) -> Result<bool, AgentError>;

    fn get_conversation(&self, conversation_id: &str) -> Result<Option<ConversationDetail>, AgentError>;

    /// All conversations, most recently interacted first.
    fn list_conversations(&self) -> Result<Vec<Conversation>, AgentError>;

    fn delete_conversation(&mut self, conversation_id: &str) -> Result<bool, AgentError>;

    fn update_title(&mut self, conversation_id: &str, title: &str) -> Result<bool, AgentError>;

    fn search_conversations(&self, query: &str) -> Result<Vec<Conversation>, AgentError>;

    fn stats(&self) -> Result<ConversationStats, AgentError>;

    /// Delete conversations idle for longer than `days`. Returns how many
    /// were removed.
    fn cleanup_older_than(&mut self, days: u32) -> Result<usize, AgentError>;
}

// ─── ConversationManager ────────────────────────────────────────────────────

/// SQLite-backed [`ConversationStore`].
pub struct ConversationManager {
    db: AgentDatabase,
}

impl ConversationManager {
    pub fn new(db: AgentDatabase) -> Self {
        Self { db }
    }
}

/// Current time as fixed-width RFC 3339, so timestamps sort lexically.
fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl ConversationStore for ConversationManager {
    fn create_conversation(&mut self, title: Option<&str>) -> Result<String, AgentError> {
        let id = uuid::Uuid::new_v4().to_string();
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TITLE);
        self.db.insert_conversation(&id, title, &now())?;
        tracing::info!(conversation_id = %id, title = %title, "conversation created");
        Ok(id)
    }

    fn add_message(&mut self, conversation_id: &str, msg: NewMessage) -> Result<bool, AgentError> {
        let id = uuid::Uuid::new_v4().to_string();
        let added = self.db.insert_message(&id, conversation_id, &msg, &now())?;
        if added {
            tracing::debug!(
                conversation_id = %conversation_id,
                role = %msg.role,
                message_type = %msg.message_type,
                "message stored"
            );
        } else {
            tracing::warn!(conversation_id = %conversation_id, "message for unknown conversation");
        }
        Ok(added)
    }

    fn get_conversation(&self, conversation_id: &str) -> Result<Option<ConversationDetail>, AgentError> {
        let Some(conversation) = self.db.get_conversation(conversation_id)? else {
            return Ok(None);
        };
        let messages = self.db.get_messages(conversation_id)?;
        Ok(Some(ConversationDetail {
            conversation,
            messages,
        }))
    }

    fn list_conversations(&self) -> Result<Vec<Conversation>, AgentError> {
        self.db.list_conversations()
    }

    fn delete_conversation(&mut self, conversation_id: &str) -> Result<bool, AgentError> {
        let deleted = self.db.delete_conversation(conversation_id)?;
        if deleted {
            tracing::info!(conversation_id = %conversation_id, "conversation deleted");
        }
        Ok(deleted)
    }

    fn update_title(&mut self, conversation_id: &str, title: &str) -> Result<bool, AgentError> {
        self.db.update_title(conversation_id, title, &now())
    }

    fn search_conversations(&self, query: &str) -> Result<Vec<Conversation>, AgentError> {
        self.db.search_conversations(query)
    }

    fn stats(&self) -> Result<ConversationStats, AgentError> {
        self.db.stats()
    }

    fn cleanup_older_than(&mut self, days: u32) -> Result<usize, AgentError> {
        let cutoff = (Utc::now() - Duration::days(i64::from(days)))
            .to_rfc3339_opts(SecondsFormat::Micros, true);
        let mut removed = 0;
        for id in self.db.conversations_before(&cutoff)? {
            if self.db.delete_conversation(&id)? {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, days, "cleaned up idle conversations");
        }
        Ok(removed)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_manager() -> ConversationManager {
        ConversationManager::new(AgentDatabase::open(":memory:").unwrap())
    }

    fn msg(role: &str, content: &str) -> NewMessage {
        NewMessage {
            role: role.into(),
            content: content.into(),
            message_type: "text".into(),
            metadata: serde_json::json!({"source": "test"}),
        }
    }

    #[test]
    fn test_create_default_title() {
        let mut mgr = test_manager();
        let id = mgr.create_conversation(None).unwrap();
        let conv = mgr.get_conversation(&id).unwrap().unwrap();
        assert_eq!(conv.conversation.title, DEFAULT_TITLE);
        assert!(conv.messages.is_empty());

        let id = mgr.create_conversation(Some("  ")).unwrap();
        assert_eq!(
            mgr.get_conversation(&id).unwrap().unwrap().conversation.title,
            DEFAULT_TITLE
        );
    }

    #[test]
    fn test_messages_in_order() {
        let mut mgr = test_manager();
        let id = mgr.create_conversation(Some("Email Meeting")).unwrap();
        for i in 0..5 {
            assert!(mgr.add_message(&id, msg("user", &format!("m{i}"))).unwrap());
        }

        let conv = mgr.get_conversation(&id).unwrap().unwrap();
        assert_eq!(conv.conversation.message_count, 5);
        let contents: Vec<&str> = conv.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m0", "m1", "m2", "m3", "m4"]);
        assert_eq!(conv.messages[0].metadata["source"], "test");
    }

    #[test]
    fn test_add_message_unknown_conversation() {
        let mut mgr = test_manager();
        assert!(!mgr.add_message("nope", msg("user", "x")).unwrap());
    }

    #[test]
    fn test_delete_and_update() {
        let mut mgr = test_manager();
        let id = mgr.create_conversation(None).unwrap();
        assert!(mgr.update_title(&id, "Renamed").unwrap());
        assert!(mgr.delete_conversation(&id).unwrap());
        assert!(mgr.get_conversation(&id).unwrap().is_none());
        assert!(!mgr.update_title(&id, "Again").unwrap());
    }

    #[test]
    fn test_cleanup_keeps_recent() {
        let mut mgr = test_manager();
        mgr.create_conversation(None).unwrap();
        assert_eq!(mgr.cleanup_older_than(30).unwrap(), 0);
        assert_eq!(mgr.list_conversations().unwrap().len(), 1);
    }

    #[test]
    fn test_store_as_trait_object() {
        let mut store: Box<dyn ConversationStore> = Box::new(test_manager());
        let id = store.create_conversation(Some("Trait")).unwrap();
        store.add_message(&id, msg("assistant", "hi")).unwrap();
        assert_eq!(store.stats().unwrap().total_messages, 1);
        assert_eq!(store.search_conversations("trait").unwrap().len(), 1);
    }
}
