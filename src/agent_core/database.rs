//! SQLite database for conversations and their messages.
//!
//! Uses `rusqlite` in synchronous mode; callers share the handle behind a
//! mutex. WAL mode is enabled for file-backed databases.

use rusqlite::{params, Connection, OptionalExtension};

use super::errors::AgentError;
use super::types::{Conversation, ConversationStats, NewMessage, StoredMessage};

// ─── Database ───────────────────────────────────────────────────────────────

/// SQLite database handle for the conversation store.
pub struct AgentDatabase {
    conn: Connection,
}

impl AgentDatabase {
    /// Open (or create) the database at the given path.
    ///
    /// Pass `":memory:"` for an in-memory database (tests).
    pub fn open(path: &str) -> Result<Self, AgentError> {
        let conn = Connection::open(path)?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Self { conn };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<(), AgentError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_interacted TEXT NOT NULL,
                message_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                type TEXT NOT NULL DEFAULT 'text',
                metadata TEXT NOT NULL DEFAULT '{}',
                timestamp TEXT NOT NULL,
                FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id);
            ",
        )?;
        Ok(())
    }

    // ─── Conversations ──────────────────────────────────────────────────

    pub fn insert_conversation(
        &self,
        id: &str,
        title: &str,
        timestamp: &str,
    ) -> Result<(), AgentError> {
        self.conn.execute(
            "INSERT INTO conversations (id, title, created_at, last_interacted, message_count)
             VALUES (?1, ?2, ?3, ?3, 0)",
            params![id, title, timestamp],
        )?;
        Ok(())
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, AgentError> {
        let result = self
            .conn
            .query_row(
                "SELECT id, title, created_at, last_interacted, message_count
                 FROM conversations WHERE id = ?1",
                params![id],
                row_to_conversation,
            )
            .optional()?;
        Ok(result)
    }

    /// List all conversations, most recently interacted first.
    pub fn list_conversations(&self) -> Result<Vec<Conversation>, AgentError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, created_at, last_interacted, message_count
             FROM conversations
             ORDER BY last_interacted DESC, rowid DESC",
        )?;
        let rows = stmt.query_map([], row_to_conversation)?;
        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row?);
        }
        Ok(conversations)
    }

    /// Update the title. Returns `false` when the conversation does not exist.
    pub fn update_title(&self, id: &str, title: &str, timestamp: &str) -> Result<bool, AgentError> {
        let changed = self.conn.execute(
            "UPDATE conversations SET title = ?2, last_interacted = ?3 WHERE id = ?1",
            params![id, title, timestamp],
        )?;
        Ok(changed > 0)
    }

    /// Delete a conversation and its messages. Returns `false` when absent.
    pub fn delete_conversation(&self, id: &str) -> Result<bool, AgentError> {
        self.conn.execute(
            "DELETE FROM messages WHERE conversation_id = ?1",
            params![id],
        )?;
        let changed = self
            .conn
            .execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Conversations whose title or any message content contains `query`
    /// (ASCII case-insensitive), most recent first.
    pub fn search_conversations(&self, query: &str) -> Result<Vec<Conversation>, AgentError> {
        let pattern = format!("%{}%", escape_like(query));
        let mut stmt = self.conn.prepare(
            "SELECT id, title, created_at, last_interacted, message_count
             FROM conversations c
             WHERE c.title LIKE ?1 ESCAPE '\\'
                OR EXISTS (
                    SELECT 1 FROM messages m
                    WHERE m.conversation_id = c.id AND m.content LIKE ?1 ESCAPE '\\'
                )
             ORDER BY last_interacted DESC, rowid DESC",
        )?;
        let rows = stmt.query_map(params![pattern], row_to_conversation)?;
        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row?);
        }
        Ok(conversations)
    }

    /// Ids of conversations last touched before `cutoff` (RFC 3339).
    pub fn conversations_before(&self, cutoff: &str) -> Result<Vec<String>, AgentError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM conversations WHERE last_interacted < ?1")?;
        let rows = stmt.query_map(params![cutoff], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    // ─── Messages ───────────────────────────────────────────────────────

    /// Insert a message and bump the conversation's counters in one
    /// transaction. Returns `false` when the conversation does not exist.
    pub fn insert_message(
        &mut self,
        id: &str,
        conversation_id: &str,
        msg: &NewMessage,
        timestamp: &str,
    ) -> Result<bool, AgentError> {
        let metadata = serde_json::to_string(&msg.metadata)?;

        let tx = self.conn.transaction()?;
        let updated = tx.execute(
            "UPDATE conversations
             SET message_count = message_count + 1, last_interacted = ?2
             WHERE id = ?1",
            params![conversation_id, timestamp],
        )?;
        if updated == 0 {
            return Ok(false);
        }
        tx.execute(
            "INSERT INTO messages (id, conversation_id, role, content, type, metadata, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                conversation_id,
                msg.role,
                msg.content,
                msg.message_type,
                metadata,
                timestamp
            ],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// All messages of a conversation in insertion order.
    pub fn get_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>, AgentError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, conversation_id, role, content, type, metadata, timestamp
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY timestamp ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![conversation_id], |row| {
            Ok(StoredMessage {
                id: row.get(0)?,
                conversation_id: row.get(1)?,
                role: row.get(2)?,
                content: row.get(3)?,
                message_type: row.get(4)?,
                metadata: parse_json_value(row.get::<_, String>(5)?),
                timestamp: row.get(6)?,
            })
        })?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn stats(&self) -> Result<ConversationStats, AgentError> {
        let total_conversations: u64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))?;
        let total_messages: u64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(ConversationStats {
            total_conversations,
            total_messages,
            avg_messages_per_conversation: total_messages as f64
                / total_conversations.max(1) as f64,
        })
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        title: row.get(1)?,
        created_at: row.get(2)?,
        last_interacted: row.get(3)?,
        message_count: row.get(4)?,
    })
}

fn parse_json_value(json: String) -> serde_json::Value {
    serde_json::from_str(&json).unwrap_or_else(|_| serde_json::json!({}))
}

fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> AgentDatabase {
        AgentDatabase::open(":memory:").unwrap()
    }

    fn text(content: &str) -> NewMessage {
        NewMessage {
            role: "user".into(),
            content: content.into(),
            message_type: "text".into(),
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn test_insert_and_get_conversation() {
        let db = test_db();
        db.insert_conversation("c1", "New Chat", "2026-01-01T00:00:00.000000Z")
            .unwrap();

        let conv = db.get_conversation("c1").unwrap().unwrap();
        assert_eq!(conv.title, "New Chat");
        assert_eq!(conv.message_count, 0);
        assert_eq!(conv.created_at, conv.last_interacted);
    }

    #[test]
    fn test_conversation_not_found() {
        let db = test_db();
        assert!(db.get_conversation("missing").unwrap().is_none());
    }

    #[test]
    fn test_insert_message_updates_counters() {
        let mut db = test_db();
        db.insert_conversation("c1", "t", "2026-01-01T00:00:00.000000Z")
            .unwrap();

        assert!(db
            .insert_message("m1", "c1", &text("hello"), "2026-01-01T00:00:01.000000Z")
            .unwrap());
        assert!(db
            .insert_message("m2", "c1", &text("again"), "2026-01-01T00:00:02.000000Z")
            .unwrap());

        let conv = db.get_conversation("c1").unwrap().unwrap();
        assert_eq!(conv.message_count, 2);
        assert_eq!(conv.last_interacted, "2026-01-01T00:00:02.000000Z");

        let messages = db.get_messages("c1").unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "hello");
        assert_eq!(messages[1].id, "m2");
    }

    #[test]
    fn test_insert_message_unknown_conversation() {
        let mut db = test_db();
        assert!(!db
            .insert_message("m1", "nope", &text("x"), "2026-01-01T00:00:00.000000Z")
            .unwrap());
        assert!(db.get_messages("nope").unwrap().is_empty());
    }

    #[test]
    fn test_list_most_recent_first() {
        let mut db = test_db();
        db.insert_conversation("old", "a", "2026-01-01T00:00:00.000000Z")
            .unwrap();
        db.insert_conversation("new", "b", "2026-01-02T00:00:00.000000Z")
            .unwrap();
        db.insert_message("m", "old", &text("bump"), "2026-01-03T00:00:00.000000Z")
            .unwrap();

        let ids: Vec<String> = db
            .list_conversations()
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["old", "new"]);
    }

    #[test]
    fn test_delete_removes_messages() {
        let mut db = test_db();
        db.insert_conversation("c1", "t", "2026-01-01T00:00:00.000000Z")
            .unwrap();
        db.insert_message("m1", "c1", &text("x"), "2026-01-01T00:00:01.000000Z")
            .unwrap();

        assert!(db.delete_conversation("c1").unwrap());
        assert!(!db.delete_conversation("c1").unwrap());
        assert!(db.get_messages("c1").unwrap().is_empty());
    }

    #[test]
    fn test_update_title() {
        let db = test_db();
        db.insert_conversation("c1", "t", "2026-01-01T00:00:00.000000Z")
            .unwrap();
        assert!(db
            .update_title("c1", "Renamed", "2026-01-05T00:00:00.000000Z")
            .unwrap());
        assert!(!db
            .update_title("nope", "x", "2026-01-05T00:00:00.000000Z")
            .unwrap());
        assert_eq!(db.get_conversation("c1").unwrap().unwrap().title, "Renamed");
    }

    #[test]
    fn test_search_title_and_content() {
        let mut db = test_db();
        db.insert_conversation("c1", "Docker Deployment", "2026-01-01T00:00:00.000000Z")
            .unwrap();
        db.insert_conversation("c2", "Other", "2026-01-02T00:00:00.000000Z")
            .unwrap();
        db.insert_message("m", "c2", &text("ask about DOCKER"), "2026-01-02T00:00:01.000000Z")
            .unwrap();
        db.insert_conversation("c3", "Unrelated", "2026-01-03T00:00:00.000000Z")
            .unwrap();

        let ids: Vec<String> = db
            .search_conversations("docker")
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["c2", "c1"]);
        assert!(db.search_conversations("100%").unwrap().is_empty());
    }

    #[test]
    fn test_stats() {
        let mut db = test_db();
        assert_eq!(db.stats().unwrap().avg_messages_per_conversation, 0.0);

        db.insert_conversation("c1", "t", "2026-01-01T00:00:00.000000Z")
            .unwrap();
        db.insert_conversation("c2", "t", "2026-01-01T00:00:00.000000Z")
            .unwrap();
        for i in 0..3 {
            db.insert_message(&format!("m{i}"), "c1", &text("x"), "2026-01-01T00:00:01.000000Z")
                .unwrap();
        }
        let stats = db.stats().unwrap();
        assert_eq!(stats.total_conversations, 2);
        assert_eq!(stats.total_messages, 3);
        assert_eq!(stats.avg_messages_per_conversation, 1.5);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
