//! Shared types for the agent core.
//!
//! Gateway requests, plan actions and results, streaming events, and the
//! conversation records persisted by the ConversationManager.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

// ─── Gateway Requests ───────────────────────────────────────────────────────

/// Client request accepted by the buffered and streaming proxy endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequest {
    /// Direct upstream URL. Takes precedence over `server_name`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub server_name: Option<String>,
    /// `listTools` or `callTool`.
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub args: Option<serde_json::Value>,
    /// Extra upstream headers.
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: HashMap<String, String>,
    /// Sent upstream unchanged when present.
    #[serde(default)]
    pub raw_payload: Option<serde_json::Value>,
}

// ─── Plans ──────────────────────────────────────────────────────────────────

/// One step of an AI-generated plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Blank when the plan omitted it; such an action fails on its own.
    #[serde(default, deserialize_with = "null_as_default")]
    pub tool: String,
    /// Metadata only; never sent upstream.
    #[serde(default, deserialize_with = "null_as_default")]
    pub reasoning: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl Action {
    /// Read one entry of a plan. Only this entry is rejected when it is
    /// malformed.
    pub fn from_entry(entry: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(entry)
    }

    /// Best-effort tool name of an entry that could not be read.
    pub fn entry_tool(entry: &serde_json::Value) -> &str {
        entry.get("tool").and_then(serde_json::Value::as_str).unwrap_or_default()
    }
}

/// Treat an explicit `null` like a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Outcome of one [`Action`]. Exactly one per input action, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub action: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn succeeded(action: &str, result: serde_json::Value) -> Self {
        Self {
            action: action.to_string(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(action: &str, error: impl Into<String>) -> Self {
        Self {
            action: action.to_string(),
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

// ─── Streaming ──────────────────────────────────────────────────────────────

/// Progress event relayed to a streaming client, serialized as
/// `{"type": "status" | "chunk" | "complete" | "error", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Status {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
    },
    Chunk {
        data: serde_json::Value,
    },
    Complete {
        data: serde_json::Value,
    },
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

impl StreamEvent {
    pub fn status(message: &str) -> Self {
        StreamEvent::Status {
            message: message.to_string(),
            payload: None,
        }
    }

    /// Whether this event ends the response (`complete` or `error`).
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete { .. } | StreamEvent::Error { .. })
    }
}

// ─── Conversations ──────────────────────────────────────────────────────────

/// Conversation metadata, as listed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 timestamp of the last message or title change.
    pub last_interacted: String,
    pub message_count: u32,
}

/// A conversation together with its messages in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<StoredMessage>,
}

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    /// `user`, `assistant`, `error`, ...
    pub role: String,
    pub content: String,
    /// `text`, `plan`, `execution_result`, ...
    #[serde(rename = "type")]
    pub message_type: String,
    pub timestamp: String,
    pub metadata: serde_json::Value,
}

/// Message fields supplied by the caller.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: String,
    pub content: String,
    pub message_type: String,
    pub metadata: serde_json::Value,
}

/// Aggregate store statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationStats {
    pub total_conversations: u64,
    pub total_messages: u64,
    pub avg_messages_per_conversation: f64,
}

// ─── Tests ──────────────────────────────────────────────────────────────────
