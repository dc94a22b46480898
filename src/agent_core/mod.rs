//! Agent Core: orchestration layer of the MCP gateway.
//!
//! Submodules:
//! - `gateway`: Target resolution, upstream calls, and envelope shaping
//! - `stream_emitter`: Per-request progress events for streaming clients
//! - `plan_executor`: Sequential execution of AI-generated action lists
//! - `conversation`: Conversation store over the SQLite database
//! - `database`: SQLite persistence for conversations and messages
//! - `types`: Shared types across the agent core
//! - `errors`: Agent-level error types

pub mod conversation;
pub mod database;
pub mod errors;
pub mod gateway;
pub mod plan_executor;
pub mod stream_emitter;
pub mod types;

// Re-exports for convenience
pub use conversation::{ConversationManager, ConversationStore};
pub use database::AgentDatabase;
pub use errors::AgentError;
pub use gateway::{McpGateway, PreparedCall};
pub use plan_executor::PlanExecutor;
pub use stream_emitter::{EmitterState, StreamEmitter};
pub use types::{
    Action, Conversation, ConversationDetail, ConversationStats, ExecutionResult, NewMessage,
    ProxyRequest, StoredMessage, StreamEvent,
};
