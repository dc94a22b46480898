//! Plan executor: runs AI-generated action lists against one MCP server.
//!
//! Actions run strictly in order, each as a `tools/call` with the action's
//! parameters as arguments. A failing or malformed action is recorded and
//! the plan moves on; the result list always has one entry per action.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::errors::AgentError;
use super::gateway::McpGateway;
use super::types::{Action, ExecutionResult, ProxyRequest};
use crate::mcp_client::normalize::{call_output, rpc_error_message, PARSE_ERROR_KEY};
use crate::mcp_client::{CallKind, McpAction};

pub struct PlanExecutor {
    gateway: Arc<McpGateway>,
    step_delay: Duration,
}

impl PlanExecutor {
    /// `step_delay` is waited between consecutive actions, never before the
    /// first or after the last.
    pub fn new(gateway: Arc<McpGateway>, step_delay: Duration) -> Self {
        Self {
            gateway,
            step_delay,
        }
    }

    /// Run every plan entry in order. Entries that do not read as an
    /// [`Action`] fail individually.
    pub async fn execute(
        &self,
        actions: &[Value],
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Vec<ExecutionResult>, AgentError> {
        if actions.is_empty() {
            return Err(AgentError::InvalidPlan {
                reason: "Invalid actions".into(),
            });
        }

        tracing::info!(url = %url, action_count = actions.len(), "executing plan");

        let mut results = Vec::with_capacity(actions.len());
        for (index, entry) in actions.iter().enumerate() {
            if index > 0 && !self.step_delay.is_zero() {
                tokio::time::sleep(self.step_delay).await;
            }

            let action = match Action::from_entry(entry) {
                Ok(action) => action,
                Err(e) => {
                    let tool = Action::entry_tool(entry);
                    tracing::warn!(step = index + 1, tool = %tool, error = %e, "malformed plan action");
                    results.push(ExecutionResult::failed(tool, format!("Invalid action: {e}")));
                    continue;
                }
            };

            let result = match self.run_action(&action, url, headers).await {
                Ok(output) => ExecutionResult::succeeded(&action.tool, output),
                Err(e) => {
                    tracing::warn!(step = index + 1, tool = %action.tool, error = %e, "plan action failed");
                    let message = match e {
                        AgentError::ActionFailed { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    ExecutionResult::failed(&action.tool, message)
                }
            };
            results.push(result);
        }

        let failed = results.iter().filter(|r| !r.success).count();
        tracing::info!(action_count = results.len(), failed, "plan complete");
        Ok(results)
    }

    async fn run_action(
        &self,
        action: &Action,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Value, AgentError> {
        let failed = |reason: String| AgentError::ActionFailed {
            tool: action.tool.clone(),
            reason,
        };

        let request = ProxyRequest {
            url: Some(url.to_string()),
            action: Some(McpAction::CallTool.to_string()),
            tool_name: Some(action.tool.clone()),
            args: Some(Value::Object(action.parameters.clone())),
            headers: headers.clone(),
            ..ProxyRequest::default()
        };

        let prepared = self
            .gateway
            .prepare(&request)
            .map_err(|e| failed(e.to_string()))?;
        let doc = self
            .gateway
            .fetch_document(&prepared)
            .await
            .map_err(|e| failed(e.to_string()))?;

        if let Some(message) = upstream_failure(&doc) {
            return Err(failed(message));
        }

        let envelope = self.gateway.shape_document(CallKind::CallTool, doc).await;
        Ok(call_output(&envelope).cloned().unwrap_or(Value::Null))
    }
}

/// A JSON-RPC error or an unreadable event-stream body.
fn upstream_failure(doc: &Value) -> Option<String> {
    rpc_error_message(doc).or_else(|| {
        doc.get(PARSE_ERROR_KEY)
            .and_then(Value::as_str)
            .map(str::to_string)
    })
}

// ─── Tests ──────────────────────────────────────────────────────────────────
