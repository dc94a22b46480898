//! OpenAI-compatible chat completion client.
//!
//! Sends non-streaming `/chat/completions` requests and returns the first
//! choice's text. Used by the LLM humanizer and title generator.

use std::time::Duration;

use reqwest::Client as HttpClient;

use super::errors::InferenceError;
use super::types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use crate::config::LlmEndpoint;

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// Client for one chat-completion endpoint.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    http: HttpClient,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl InferenceClient {
    /// Create a client from an endpoint configuration. Does NOT check
    /// connectivity; that happens on the first request.
    pub fn from_config(endpoint: &LlmEndpoint) -> Result<Self, InferenceError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(endpoint.timeout())
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: endpoint.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            model: endpoint.model.clone(),
            api_key: endpoint.api_key.clone().filter(|k| !k.is_empty()),
            timeout_secs: endpoint.timeout_secs,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a chat completion request and return the reply text, trimmed.
    pub async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, InferenceError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature,
            max_tokens,
            stream: false,
        };

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| InferenceError::from_send(&url, self.timeout_secs, e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| InferenceError::ResponseError {
                reason: format!("failed to read response body: {e}"),
            })?;

        parse_completion(&body_text)
    }
}

/// Extract the first choice's content from a completion body.
pub fn parse_completion(body: &str) -> Result<String, InferenceError> {
    let resp: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::ResponseError {
            reason: format!("failed to parse completion: {e}"),
        })?;

    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| InferenceError::ResponseError {
            reason: "completion had no content".into(),
        })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
