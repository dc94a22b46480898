//! JSON-RPC over HTTP transport.
//!
//! Handles low-level communication with upstream MCP servers:
//! - POSTing JSON-RPC payloads with the MCP `Accept` header
//! - Classifying the response as a JSON document or event-stream frames
//! - Streaming frames incrementally when the caller asks for it

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::Value;

use super::errors::McpError;
use super::frames::{frame_stream, looks_like_event_stream, parse_frames, ParsedFrame};

/// Fixed deadline for every upstream call.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(60);

const MCP_ACCEPT: &str = "application/json, text/event-stream";
const EVENT_STREAM: &str = "text/event-stream";

// ─── Request ID Generator ────────────────────────────────────────────────────

/// Monotonic JSON-RPC id source shared by every request handler.
#[derive(Debug)]
pub struct RpcIdAllocator {
    next: AtomicU64,
}

impl RpcIdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next id. Never returns the same value twice for one
    /// allocator, even under concurrent callers.
    pub fn next(&self) -> String {
        self.next.fetch_add(1, Ordering::Relaxed).to_string()
    }
}

impl Default for RpcIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Response ────────────────────────────────────────────────────────────────

/// Incrementally decoded frames from a live upstream body.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<ParsedFrame, McpError>> + Send>>;

/// Classified upstream response.
pub enum RawResponse {
    /// A single JSON document, or `{"raw": text}` when the body was not JSON.
    Document(Value),
    /// A fully buffered body that used event-stream framing.
    Frames {
        frames: Vec<ParsedFrame>,
        text: String,
    },
    /// A declared event-stream read incrementally.
    Stream(FrameStream),
}

impl fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawResponse::Document(doc) => f.debug_tuple("Document").field(doc).finish(),
            RawResponse::Frames { frames, .. } => {
                f.debug_struct("Frames").field("frames", frames).finish()
            }
            RawResponse::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// Sends one JSON-RPC payload to an upstream MCP server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `payload` to `url`.
    ///
    /// With `streaming`, a declared event-stream is returned as
    /// [`RawResponse::Stream`] instead of being buffered.
    async fn send(
        &self,
        url: &str,
        payload: &Value,
        headers: &HashMap<String, String>,
        streaming: bool,
    ) -> Result<RawResponse, McpError>;
}

/// [`Transport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport with the fixed upstream timeout.
    pub fn new() -> Result<Self, McpError> {
        Self::with_timeout(UPSTREAM_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, McpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| McpError::ConfigError {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, timeout })
    }

    fn request_headers(&self, extra: &HashMap<String, String>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in extra {
            let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) else {
                tracing::warn!(header = %name, "skipping invalid upstream header");
                continue;
            };
            if name == CONTENT_TYPE {
                continue;
            }
            headers.insert(name, value);
        }
        headers.insert(ACCEPT, HeaderValue::from_static(MCP_ACCEPT));
        headers
    }

    fn map_send_error(&self, url: &str, e: reqwest::Error) -> McpError {
        if e.is_timeout() {
            McpError::Timeout {
                url: url.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            McpError::Unreachable {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        url: &str,
        payload: &Value,
        headers: &HashMap<String, String>,
        streaming: bool,
    ) -> Result<RawResponse, McpError> {
        tracing::debug!(url = %url, streaming, "sending upstream request");

        let response = self
            .client
            .post(url)
            .headers(self.request_headers(headers))
            .json(payload)
            .send()
            .await
            .map_err(|e| self.map_send_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %url, status = %status, "upstream returned non-success status");
        }

        let declared_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.to_ascii_lowercase().contains(EVENT_STREAM));

        if declared_stream && streaming {
            tracing::debug!(url = %url, "relaying upstream event stream");
            let stream_url = url.to_string();
            let timeout_secs = self.timeout.as_secs();
            let frames = frame_stream(response.bytes_stream(), move |e| {
                body_read_error(&stream_url, timeout_secs, e)
            });
            return Ok(RawResponse::Stream(Box::pin(frames)));
        }

        let text = response
            .text()
            .await
            .map_err(|e| body_read_error(url, self.timeout.as_secs(), e))?;

        Ok(classify_body(url, text, declared_stream))
    }
}

/// A failure while reading a response body. The request timeout also covers
/// the body, so it surfaces here as well.
fn body_read_error(url: &str, timeout_secs: u64, e: reqwest::Error) -> McpError {
    if e.is_timeout() {
        McpError::Timeout {
            url: url.to_string(),
            timeout_secs,
        }
    } else {
        McpError::StreamError {
            url: url.to_string(),
            reason: format!("failed to read body: {e}"),
        }
    }
}

/// Classify a fully buffered body.
///
/// Upstreams are not trusted to label event streams correctly, so a body
/// that looks like event-stream framing is treated as frames regardless of
/// its declared type.
pub fn classify_body(url: &str, text: String, declared_stream: bool) -> RawResponse {
    if declared_stream || looks_like_event_stream(&text) {
        if !declared_stream {
            tracing::debug!(url = %url, "event-stream framing detected in non-stream response");
        }
        let frames = parse_frames(&text);
        return RawResponse::Frames { frames, text };
    }

    match serde_json::from_str(&text) {
        Ok(doc) => RawResponse::Document(doc),
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "upstream body is not JSON, passing through raw");
            RawResponse::Document(serde_json::json!({ "raw": text }))
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
