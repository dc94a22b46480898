//! Outgoing request construction.
//!
//! Turns a client's `{action, toolName, args, rawPayload}` into the JSON body
//! posted upstream, and remembers which envelope the response should be
//! normalized into.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use super::errors::McpError;
use super::transport::RpcIdAllocator;
use super::types::{RpcRequest, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST};

/// The two actions the gateway knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpAction {
    ListTools,
    CallTool,
}

impl McpAction {
    /// Wire name used by clients.
    pub fn as_str(&self) -> &'static str {
        match self {
            McpAction::ListTools => "listTools",
            McpAction::CallTool => "callTool",
        }
    }
}

impl FromStr for McpAction {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "listTools" => Ok(McpAction::ListTools),
            "callTool" => Ok(McpAction::CallTool),
            other => Err(McpError::validation(format!("unsupported action '{other}'"))),
        }
    }
}

impl fmt::Display for McpAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the upstream response to an [`OutgoingCall`] is shaped for the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Normalize into the tools-list envelope.
    ListTools,
    /// Normalize into the tool-call envelope.
    CallTool,
    /// Raw payload with no recognized action: return the upstream document as-is.
    Passthrough,
}

impl From<McpAction> for CallKind {
    fn from(action: McpAction) -> Self {
        match action {
            McpAction::ListTools => CallKind::ListTools,
            McpAction::CallTool => CallKind::CallTool,
        }
    }
}

/// A fully built upstream request body plus its response shaping.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingCall {
    pub kind: CallKind,
    pub payload: Value,
}

/// Build the upstream request body.
///
/// A non-null `raw_payload` is sent unchanged. Otherwise `action` selects
/// `tools/list` or `tools/call`; `callTool` requires a non-empty `tool_name`
/// and defaults missing `args` to `{}`.
pub fn build_call(
    ids: &RpcIdAllocator,
    action: Option<&str>,
    tool_name: Option<&str>,
    args: Option<Value>,
    raw_payload: Option<Value>,
) -> Result<OutgoingCall, McpError> {
    let action = action.map(str::parse::<McpAction>);

    if let Some(payload) = raw_payload.filter(|p| !p.is_null()) {
        let kind = match action {
            Some(Ok(a)) => CallKind::from(a),
            _ => CallKind::Passthrough,
        };
        return Ok(OutgoingCall { kind, payload });
    }

    let action = match action {
        Some(Ok(a)) => a,
        _ => return Err(McpError::validation("Invalid action or payload")),
    };

    let request = match action {
        McpAction::ListTools => {
            RpcRequest::new(ids.next(), METHOD_TOOLS_LIST, serde_json::json!({}))
        }
        McpAction::CallTool => {
            let name = tool_name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .ok_or_else(|| McpError::validation("Missing toolName for callTool"))?;
            let arguments = match args {
                None | Some(Value::Null) => serde_json::json!({}),
                Some(v) => v,
            };
            RpcRequest::new(
                ids.next(),
                METHOD_TOOLS_CALL,
                serde_json::json!({ "name": name, "arguments": arguments }),
            )
        }
    };

    let payload = serde_json::to_value(&request).map_err(|e| McpError::Validation {
        reason: format!("failed to serialize request: {e}"),
    })?;

    Ok(OutgoingCall {
        kind: action.into(),
        payload,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_tools_request() {
        let ids = RpcIdAllocator::new();
        let call = build_call(&ids, Some("listTools"), None, None, None).unwrap();
        assert_eq!(call.kind, CallKind::ListTools);
        assert_eq!(call.payload["jsonrpc"], "2.0");
        assert_eq!(call.payload["method"], "tools/list");
        assert_eq!(call.payload["params"], json!({}));
        assert_eq!(call.payload["id"], "1");
    }

    #[test]
    fn test_call_tool_request() {
        let ids = RpcIdAllocator::new();
        let call = build_call(
            &ids,
            Some("callTool"),
            Some("send_email"),
            Some(json!({"to": "a@b.c"})),
            None,
        )
        .unwrap();
        assert_eq!(call.kind, CallKind::CallTool);
        assert_eq!(call.payload["method"], "tools/call");
        assert_eq!(
            call.payload["params"],
            json!({"name": "send_email", "arguments": {"to": "a@b.c"}})
        );
    }

    #[test]
    fn test_call_tool_defaults_arguments() {
        let ids = RpcIdAllocator::new();
        let call = build_call(&ids, Some("callTool"), Some("ping"), Some(Value::Null), None).unwrap();
        assert_eq!(call.payload["params"]["arguments"], json!({}));
    }

    #[test]
    fn test_call_tool_requires_tool_name() {
        let ids = RpcIdAllocator::new();
        for name in [None, Some(""), Some("   ")] {
            let err = build_call(&ids, Some("callTool"), name, None, None).unwrap_err();
            assert!(err.is_client_error());
        }
    }

    #[test]
    fn test_unknown_action_rejected() {
        let ids = RpcIdAllocator::new();
        assert!(build_call(&ids, Some("deleteEverything"), None, None, None).is_err());
        assert!(build_call(&ids, None, None, None, None).is_err());
    }

    #[test]
    fn test_raw_payload_passthrough() {
        let ids = RpcIdAllocator::new();
        let raw = json!({"jsonrpc": "2.0", "id": "custom", "method": "resources/list"});
        let call = build_call(&ids, None, None, None, Some(raw.clone())).unwrap();
        assert_eq!(call.kind, CallKind::Passthrough);
        assert_eq!(call.payload, raw);
        // no id was consumed
        assert_eq!(ids.next(), "1");
    }

    #[test]
    fn test_raw_payload_with_action_keeps_normalization() {
        let ids = RpcIdAllocator::new();
        let raw = json!({"method": "tools/list"});
        let call = build_call(&ids, Some("listTools"), None, None, Some(raw.clone())).unwrap();
        assert_eq!(call.kind, CallKind::ListTools);
        assert_eq!(call.payload, raw);
    }

    #[test]
    fn test_action_round_trip() {
        assert_eq!("callTool".parse::<McpAction>().unwrap(), McpAction::CallTool);
        assert_eq!(McpAction::ListTools.to_string(), "listTools");
    }
}
