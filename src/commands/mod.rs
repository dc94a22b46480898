//! HTTP commands exposed to gateway clients.
//!
//! Each submodule holds the axum handlers for one area; [`router`] wires them
//! to their paths behind request tracing and a permissive CORS policy.

pub mod execute;
pub mod proxy;
pub mod session;
pub mod speech;

use std::sync::{Arc, Mutex};

use axum::extract::rejection::JsonRejection;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::agent_core::stream_emitter::UPSTREAM_FAILURE;
use crate::agent_core::{AgentError, ConversationStore, McpGateway, PlanExecutor};
use crate::inference::{SpeechTranscriber, TitleGenerator};
use crate::mcp_client::McpError;

const INVALID_BODY: &str = "Invalid JSON body";

/// Largest accepted speech-to-text upload.
const MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;

// ─── State ──────────────────────────────────────────────────────────────────

/// Shared handler state. Cloned per request; everything inside is shared.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<McpGateway>,
    pub executor: Arc<PlanExecutor>,
    pub conversations: Arc<Mutex<dyn ConversationStore>>,
    pub titles: Arc<dyn TitleGenerator>,
    /// `None` when no transcription endpoint is configured.
    pub transcriber: Option<Arc<dyn SpeechTranscriber>>,
}

impl AppState {
    /// Run `f` against the conversation store.
    pub(crate) fn with_store<T>(
        &self,
        f: impl FnOnce(&mut dyn ConversationStore) -> Result<T, AgentError>,
    ) -> Result<T, ApiError> {
        let mut store = self
            .conversations
            .lock()
            .map_err(|e| ApiError::internal(format!("conversation store lock poisoned: {e}")))?;
        f(&mut *store).map_err(ApiError::from)
    }
}

// ─── Router ─────────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/proxy", post(proxy::proxy))
        .route("/proxy/stream", post(proxy::proxy_stream))
        .route("/proxy/ai/execute", post(execute::execute_plan))
        .route("/title", post(session::generate_title))
        .route("/conversations", get(session::list_conversations))
        .route("/conversations/stats", get(session::conversation_stats))
        .route("/conversation", post(session::create_conversation))
        .route(
            "/conversation/{id}",
            get(session::get_conversation).delete(session::delete_conversation),
        )
        .route("/conversation/{id}/title", put(session::update_title))
        .route("/add_message", post(session::add_message))
        .route(
            "/speech-to-text",
            post(speech::speech_to_text).layer(DefaultBodyLimit::max(MAX_AUDIO_BYTES)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    }))
}

// ─── Errors ─────────────────────────────────────────────────────────────────

/// Error body returned by every buffered endpoint:
/// `{"error": <message>, "details"?: <detail>}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    details: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            details: None,
        }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    pub fn not_found(error: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, error)
    }

    pub fn internal(error: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<McpError> for ApiError {
    fn from(e: McpError) -> Self {
        match e {
            McpError::Validation { reason } => Self::bad_request(reason),
            McpError::ConfigError { .. } => Self::internal(e),
            McpError::Timeout { .. } => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, UPSTREAM_FAILURE).with_details(e.to_string())
            }
            McpError::Unreachable { .. } | McpError::StreamError { .. } => {
                Self::new(StatusCode::BAD_GATEWAY, UPSTREAM_FAILURE).with_details(e.to_string())
            }
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::ConversationNotFound { .. } => Self::not_found("Conversation not found"),
            AgentError::InvalidPlan { reason } => Self::bad_request(reason),
            other => Self::internal(other),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(INVALID_BODY).with_details(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.error, details = ?self.details, "request failed");
        } else {
            tracing::debug!(status = %self.status, error = %self.error, "request rejected");
        }

        let mut body = json!({ "error": self.error });
        if let Some(details) = self.details {
            body["details"] = Value::String(details);
        }
        (self.status, Json(body)).into_response()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
