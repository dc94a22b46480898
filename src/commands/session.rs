//! Conversation and title endpoints.
//!
//! Thin wrappers over the [`ConversationStore`]: validate the body, run one
//! store operation under the lock, and shape the reply.
//!
//! [`ConversationStore`]: crate::agent_core::ConversationStore

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ApiError, AppState};
use crate::agent_core::conversation::DEFAULT_TITLE;
use crate::agent_core::{ConversationDetail, ConversationStats, NewMessage};

const DEFAULT_PROVIDER: &str = "gemini";
const DEFAULT_MESSAGE_TYPE: &str = "text";
const NOT_FOUND: &str = "Conversation not found";

// ─── Request Types ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct TitleRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Case-insensitive match on titles and message content.
    #[serde(default)]
    pub q: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTitleRequest {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AddMessageRequest {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    /// Usually text; structured content is stored as its JSON rendering.
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default, rename = "type")]
    pub message_type: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ─── Titles ─────────────────────────────────────────────────────────────────

/// `POST /title`
pub async fn generate_title(
    State(state): State<AppState>,
    payload: Result<Json<TitleRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload?;
    let query = non_empty(req.query).ok_or_else(|| ApiError::bad_request("Missing query parameter"))?;
    let provider = non_empty(req.provider).unwrap_or_else(|| DEFAULT_PROVIDER.to_string());

    let title = state.titles.generate_title(&query, &provider).await;
    Ok(Json(json!({
        "title": title,
        "query": query,
        "provider": provider,
    })))
}

// ─── Conversations ──────────────────────────────────────────────────────────

/// `GET /conversations`, most recently active first. `?q=` filters.
pub async fn list_conversations(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let conversations = state.with_store(|store| match non_empty(params.q) {
        Some(q) => store.search_conversations(&q),
        None => store.list_conversations(),
    })?;
    Ok(Json(json!({
        "total": conversations.len(),
        "conversations": conversations,
    })))
}

/// `GET /conversations/stats`
pub async fn conversation_stats(
    State(state): State<AppState>,
) -> Result<Json<ConversationStats>, ApiError> {
    Ok(Json(state.with_store(|store| store.stats())?))
}

/// `POST /conversation`: the body is optional.
pub async fn create_conversation(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let req: CreateConversationRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateConversationRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {e}")))?
    };
    let title = non_empty(req.title)
        .map(|t| t.trim().to_string())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    let conversation_id = state.with_store(|store| store.create_conversation(Some(&title)))?;
    Ok(Json(json!({
        "conversation_id": conversation_id,
        "title": title,
        "created": true,
    })))
}

/// `GET /conversation/{id}`
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationDetail>, ApiError> {
    state
        .with_store(|store| store.get_conversation(&id))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))
}

/// `DELETE /conversation/{id}`
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.with_store(|store| store.delete_conversation(&id))? {
        return Err(ApiError::not_found(NOT_FOUND));
    }
    Ok(Json(json!({ "deleted": true, "conversation_id": id })))
}

/// `PUT /conversation/{id}/title`
pub async fn update_title(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateTitleRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload?;
    let title = non_empty(req.title).ok_or_else(|| ApiError::bad_request("Missing title"))?;
    if !state.with_store(|store| store.update_title(&id, &title))? {
        return Err(ApiError::not_found(NOT_FOUND));
    }
    Ok(Json(json!({
        "updated": true,
        "conversation_id": id,
        "title": title,
    })))
}

/// `POST /add_message`
pub async fn add_message(
    State(state): State<AppState>,
    payload: Result<Json<AddMessageRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload?;
    let content = match req.content {
        Some(Value::String(s)) => Some(s),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    };
    let (Some(conversation_id), Some(role), Some(content)) =
        (non_empty(req.conversation_id), non_empty(req.role), non_empty(content))
    else {
        return Err(ApiError::bad_request(
            "Missing required fields: conversation_id, role, content",
        ));
    };

    let message_type =
        non_empty(req.message_type).unwrap_or_else(|| DEFAULT_MESSAGE_TYPE.to_string());
    let message = NewMessage {
        role: role.clone(),
        content,
        message_type: message_type.clone(),
        metadata: req.metadata.unwrap_or_else(|| json!({})),
    };

    if !state.with_store(|store| store.add_message(&conversation_id, message))? {
        return Err(ApiError::not_found(NOT_FOUND));
    }
    Ok(Json(json!({
        "added": true,
        "conversation_id": conversation_id,
        "role": role,
        "type": message_type,
    })))
}
