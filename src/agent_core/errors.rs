//! Agent Core error types.

use thiserror::Error;

/// Errors that can occur during agent core operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Database operation failed.
    #[error("database error: {reason}")]
    DatabaseError { reason: String },

    /// Conversation not found.
    #[error("conversation not found: '{conversation_id}'")]
    ConversationNotFound { conversation_id: String },

    /// Plan was rejected before any action ran.
    #[error("invalid plan: {reason}")]
    InvalidPlan { reason: String },

    /// A single plan action failed. Captured into its result, never raised
    /// out of the executor.
    #[error("action '{tool}' failed: {reason}")]
    ActionFailed { tool: String, reason: String },

    /// Serialization error.
    #[error("serialization error: {reason}")]
    SerializationError { reason: String },
}

impl From<rusqlite::Error> for AgentError {
    fn from(e: rusqlite::Error) -> Self {
        AgentError::DatabaseError {
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::SerializationError {
            reason: e.to_string(),
        }
    }
}
