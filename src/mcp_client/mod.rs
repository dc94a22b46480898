//! MCP Client: JSON-RPC over HTTP for upstream MCP servers.
//!
//! This module handles:
//! - Resolving logical server names to upstream URLs
//! - Building `tools/list` / `tools/call` JSON-RPC payloads
//! - Sending them over HTTP and classifying JSON vs event-stream responses
//! - Decoding event-stream frames, incrementally when streaming
//! - Normalizing upstream responses into the canonical envelopes

pub mod errors;
pub mod frames;
pub mod normalize;
pub mod registry;
pub mod request;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use errors::McpError;
pub use frames::ParsedFrame;
pub use normalize::{normalize_tool_call, normalize_tools};
pub use registry::ServerRegistry;
pub use request::{build_call, CallKind, McpAction, OutgoingCall};
pub use transport::{HttpTransport, RawResponse, RpcIdAllocator, Transport, UPSTREAM_TIMEOUT};
pub use types::{RpcRequest, ServerEntry, ServerMap, ToolDescriptor};
