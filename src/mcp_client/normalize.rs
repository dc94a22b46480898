//! Response envelope normalization.
//!
//! Upstream servers disagree on where they put tool lists and call output.
//! Each document is first classified into one of a fixed set of known shapes,
//! checked in priority order, and then rebuilt into the canonical envelope:
//!
//! - tools list: `{"result": {"tools": [...]}}`
//! - tool call:  `{"result": {"output": ...}}`
//!
//! Both functions are total and idempotent.

use serde_json::{json, Value};

/// Diagnostic key attached when an event-stream body could not be parsed.
pub const PARSE_ERROR_KEY: &str = "parseError";

// ─── Tools list ──────────────────────────────────────────────────────────────

/// Known shapes of a `tools/list` response, in priority order.
#[derive(Debug, PartialEq)]
enum ToolsShape<'a> {
    /// `{"result": {"tools": ...}}`
    Canonical,
    /// `{"tools": ...}`
    TopLevel(&'a Value),
    /// `{"result": [...]}`
    ResultList(&'a Value),
    /// `{"error": ...}` or a parse-error marker.
    Failed,
    /// Anything else, including non-objects.
    Opaque,
}

fn classify_tools(doc: &Value) -> ToolsShape<'_> {
    let Some(obj) = doc.as_object() else {
        return ToolsShape::Opaque;
    };

    match obj.get("result") {
        Some(Value::Object(result)) if result.contains_key("tools") => {
            return ToolsShape::Canonical
        }
        _ => {}
    }
    if let Some(tools) = obj.get("tools") {
        return ToolsShape::TopLevel(tools);
    }
    if let Some(list @ Value::Array(_)) = obj.get("result") {
        return ToolsShape::ResultList(list);
    }
    if obj.contains_key("error") || obj.contains_key(PARSE_ERROR_KEY) {
        return ToolsShape::Failed;
    }
    ToolsShape::Opaque
}

/// Normalize any upstream document into the tools-list envelope.
///
/// Errors degrade to an empty list so a discovery failure never blocks the
/// caller.
pub fn normalize_tools(doc: Value) -> Value {
    match classify_tools(&doc) {
        ToolsShape::Canonical => doc,
        ToolsShape::TopLevel(tools) | ToolsShape::ResultList(tools) => {
            json!({ "result": { "tools": tools.clone() } })
        }
        ToolsShape::Failed => {
            tracing::warn!(doc = %doc, "upstream tools/list failed, returning empty list");
            empty_tools()
        }
        ToolsShape::Opaque => empty_tools(),
    }
}

fn empty_tools() -> Value {
    json!({ "result": { "tools": [] } })
}

// ─── Tool call ───────────────────────────────────────────────────────────────

/// Known shapes of a `tools/call` response, in priority order.
#[derive(Debug, PartialEq)]
enum CallShape<'a> {
    /// `{"result": {"output": ...}}`
    Canonical,
    /// `{"result": <anything without output>}`
    Result(&'a Value),
    /// `{"error": ...}` or a parse-error marker; carries the error detail.
    Failed(&'a Value),
    /// Anything else; the whole document becomes the output.
    Opaque,
}

fn classify_call(doc: &Value) -> CallShape<'_> {
    let Some(obj) = doc.as_object() else {
        return CallShape::Opaque;
    };

    if let Some(result) = obj.get("result") {
        return match result {
            Value::Object(inner) if inner.contains_key("output") => CallShape::Canonical,
            other => CallShape::Result(other),
        };
    }
    if let Some(error) = obj.get("error") {
        return CallShape::Failed(error);
    }
    if let Some(marker) = obj.get(PARSE_ERROR_KEY) {
        return CallShape::Failed(marker);
    }
    CallShape::Opaque
}

/// Normalize any upstream document into the tool-call envelope.
///
/// Upstream errors are kept inside the output slot as `{"error": ...}` so the
/// client-visible shape stays uniform.
pub fn normalize_tool_call(doc: Value) -> Value {
    match classify_call(&doc) {
        CallShape::Canonical => doc,
        CallShape::Result(result) => json!({ "result": { "output": result.clone() } }),
        CallShape::Failed(error) => json!({ "result": { "output": { "error": error.clone() } } }),
        CallShape::Opaque => json!({ "result": { "output": doc } }),
    }
}

/// The `output` slot of a normalized tool-call envelope.
pub fn call_output(envelope: &Value) -> Option<&Value> {
    envelope.get("result").and_then(|r| r.get("output"))
}

/// Top-level JSON-RPC error message carried by an upstream document, if any.
///
/// Uses `error.message` when present, otherwise the error's JSON rendering.
pub fn rpc_error_message(doc: &Value) -> Option<String> {
    let error = doc.as_object()?.get("error")?;
    if error.is_null() {
        return None;
    }
    Some(match error.get("message").and_then(Value::as_str) {
        Some(message) => message.to_string(),
        None => match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
