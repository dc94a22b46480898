//! Plan execution endpoint.

use std::collections::HashMap;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ApiError, AppState};
use crate::agent_core::types::null_as_default;

const INVALID_ACTIONS: &str = "Invalid actions";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    /// Kept untyped so a malformed entry fails alone instead of the whole plan.
    #[serde(default)]
    pub actions: Option<Value>,
    #[serde(default)]
    pub url: Option<String>,
    /// Older clients send the target as `mcpUrl`.
    #[serde(default)]
    pub mcp_url: Option<String>,
    #[serde(default)]
    pub server_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: HashMap<String, String>,
}

/// `POST /proxy/ai/execute`: run every action in order against one server.
pub async fn execute_plan(
    State(state): State<AppState>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload?;
    let url = state.gateway.resolve_target(
        req.url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .or(req.mcp_url.as_deref()),
        req.server_name.as_deref(),
    )?;

    // Entries are read one by one by the executor.
    let Some(Value::Array(actions)) = req.actions else {
        return Err(ApiError::bad_request(INVALID_ACTIONS));
    };

    let results = state
        .executor
        .execute(&actions, &url, &req.headers)
        .await?;

    Ok(Json(json!({
        "status": "completed",
        "results": results,
    })))
}
