//! Stream emitter: relays one upstream call to a client as progress events.
//!
//! Every response follows the same lifecycle:
//!
//! ```text
//! Started ─status─▶ Sent ─┬─ event-stream ─▶ ReceivingFrames ─chunk*─┐
//!                         ├─ document ─────▶ ReceivingDocument ──────┼─▶ Closing ─complete─▶ Closed
//!                         └─ failure ────────────────────────────────┴─▶ Closing ─error────▶ Closed
//! ```
//!
//! Exactly one terminal event (`complete` or `error`) is sent. A client that
//! goes away ends the emitter immediately and drops the upstream call.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;

use super::gateway::{document_from_frames, McpGateway, PreparedCall};
use super::types::StreamEvent;
use crate::mcp_client::transport::FrameStream;
use crate::mcp_client::{CallKind, McpError, RawResponse};

pub const STATUS_SENDING: &str = "Sending request to MCP server...";
pub const STATUS_PROCESSING_SSE: &str = "Processing SSE response...";
pub const STATUS_COMPLETE: &str = "Response complete";
pub const UPSTREAM_FAILURE: &str = "Failed to reach MCP server";

/// Buffered events between the emitter task and the client connection.
pub const EVENT_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterState {
    Started,
    Sent,
    ReceivingFrames,
    ReceivingDocument,
    Closing,
    Closed,
}

pub struct StreamEmitter {
    gateway: Arc<McpGateway>,
    tx: mpsc::Sender<StreamEvent>,
    state: EmitterState,
}

impl StreamEmitter {
    pub fn new(gateway: Arc<McpGateway>, tx: mpsc::Sender<StreamEvent>) -> Self {
        Self {
            gateway,
            tx,
            state: EmitterState::Started,
        }
    }

    /// Run a prepared call on a background task and return its events.
    pub fn spawn(gateway: Arc<McpGateway>, prepared: PreparedCall) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(Self::new(gateway, tx).run(prepared));
        rx
    }

    pub fn state(&self) -> EmitterState {
        self.state
    }

    pub async fn run(mut self, prepared: PreparedCall) {
        let kind = prepared.kind();
        let sending = StreamEvent::Status {
            message: STATUS_SENDING.to_string(),
            payload: Some(prepared.call.payload.clone()),
        };
        if !self.emit(sending).await {
            return;
        }

        let gateway = Arc::clone(&self.gateway);
        let tx = self.tx.clone();
        let response = tokio::select! {
            response = gateway.send(&prepared, true) => response,
            _ = tx.closed() => {
                tracing::debug!(url = %prepared.url, "client left before upstream answered");
                self.transition(EmitterState::Closed);
                return;
            }
        };
        drop(tx);
        self.transition(EmitterState::Sent);

        match response {
            Ok(RawResponse::Stream(frames)) => self.relay_frames(kind, frames).await,
            Ok(RawResponse::Frames { frames, text }) => {
                // Event-stream framing under a non-stream content type.
                self.relay_document(kind, document_from_frames(frames, text))
                    .await
            }
            Ok(RawResponse::Document(doc)) => self.relay_document(kind, doc).await,
            Err(e) => self.fail(e).await,
        }
    }

    async fn relay_frames(&mut self, kind: CallKind, mut frames: FrameStream) {
        self.transition(EmitterState::ReceivingFrames);
        if !self.emit(StreamEvent::status(STATUS_PROCESSING_SSE)).await {
            return;
        }

        let mut last = None;
        let mut count = 0usize;
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(frame) => {
                    let data = self.gateway.shape_frame(kind, frame).await;
                    if !self.emit(StreamEvent::Chunk { data: data.clone() }).await {
                        return;
                    }
                    count += 1;
                    last = Some(data);
                }
                Err(e) => return self.fail(e).await,
            }
        }
        tracing::debug!(frames = count, "upstream event stream ended");

        let data = match last {
            Some(data) => data,
            None => self.gateway.shape_document(kind, json!({})).await,
        };
        self.finish(data).await;
    }

    async fn relay_document(&mut self, kind: CallKind, doc: serde_json::Value) {
        self.transition(EmitterState::ReceivingDocument);
        let data = self.gateway.shape_document(kind, doc).await;
        self.finish(data).await;
    }

    async fn finish(&mut self, data: serde_json::Value) {
        self.transition(EmitterState::Closing);
        if self.emit(StreamEvent::Complete { data }).await {
            self.emit(StreamEvent::status(STATUS_COMPLETE)).await;
        }
        self.transition(EmitterState::Closed);
    }

    async fn fail(&mut self, error: McpError) {
        tracing::warn!(error = %error, "streaming proxy call failed");
        self.transition(EmitterState::Closing);
        self.emit(StreamEvent::Error {
            error: UPSTREAM_FAILURE.to_string(),
            details: Some(error.to_string()),
        })
        .await;
        self.transition(EmitterState::Closed);
    }

    /// Send one event. Returns false once the client is gone.
    async fn emit(&mut self, event: StreamEvent) -> bool {
        if self.state == EmitterState::Closed {
            return false;
        }
        if self.tx.send(event).await.is_err() {
            tracing::debug!(state = ?self.state, "client disconnected, stopping stream");
            self.transition(EmitterState::Closed);
            return false;
        }
        true
    }

    fn transition(&mut self, next: EmitterState) {
        tracing::trace!(from = ?self.state, to = ?next, "emitter transition");
        self.state = next;
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_core::gateway::tests::{gateway_with, FakeReply, FakeTransport};
    use crate::agent_core::types::ProxyRequest;
    use crate::inference::humanizer::PrettyJsonHumanizer;
    use crate::mcp_client::ParsedFrame;
    use serde_json::Value;

    async fn collect(reply: FakeReply, request: Value) -> Vec<StreamEvent> {
        let gateway = Arc::new(gateway_with(FakeTransport::new(vec![reply]), None));
        let request: ProxyRequest = serde_json::from_value(request).unwrap();
        let prepared = gateway.prepare(&request).unwrap();
        let mut rx = StreamEmitter::spawn(gateway, prepared);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn list_tools() -> Value {
        serde_json::json!({"serverName": "A", "action": "listTools"})
    }

    fn terminal_count(events: &[StreamEvent]) -> usize {
        events.iter().filter(|e| e.is_terminal()).count()
    }

    #[tokio::test]
    async fn test_document_response() {
        let events = collect(
            FakeReply::Document(json!({"tools": [{"name": "t"}]})),
            list_tools(),
        )
        .await;

        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[0],
            StreamEvent::Status { message, payload: Some(p) }
                if message == STATUS_SENDING && p["method"] == "tools/list"
        ));
        assert_eq!(
            events[1],
            StreamEvent::Complete { data: json!({"result": {"tools": [{"name": "t"}]}}) }
        );
        assert_eq!(events[2], StreamEvent::status(STATUS_COMPLETE));
    }

    #[tokio::test]
    async fn test_frames_relayed_as_chunks() {
        let events = collect(
            FakeReply::Stream(vec![
                Ok(ParsedFrame::Parsed(json!({"result": {"tools": [{"name": "a"}]}}))),
                Ok(ParsedFrame::Raw("not-json".into())),
                Ok(ParsedFrame::Parsed(json!({"tools": [{"name": "b"}]}))),
            ]),
            list_tools(),
        )
        .await;

        assert_eq!(events[1], StreamEvent::status(STATUS_PROCESSING_SSE));
        assert_eq!(
            events[2],
            StreamEvent::Chunk { data: json!({"result": {"tools": [{"name": "a"}]}}) }
        );
        assert_eq!(events[3], StreamEvent::Chunk { data: json!({"raw": "not-json"}) });
        let last = json!({"result": {"tools": [{"name": "b"}]}});
        assert_eq!(events[4], StreamEvent::Chunk { data: last.clone() });
        assert_eq!(events[5], StreamEvent::Complete { data: last });
        assert_eq!(events[6], StreamEvent::status(STATUS_COMPLETE));
        assert_eq!(events.len(), 7);
        assert_eq!(terminal_count(&events), 1);
    }

    #[tokio::test]
    async fn test_tool_call_frames_humanized() {
        let gateway = Arc::new(gateway_with(
            FakeTransport::new(vec![FakeReply::Stream(vec![
                Ok(ParsedFrame::Parsed(json!({"result": {"sent": true}}))),
                Ok(ParsedFrame::Raw("keepalive".into())),
                Ok(ParsedFrame::Parsed(json!({"result": {"output": ["a", "b"]}}))),
            ])]),
            Some(Arc::new(PrettyJsonHumanizer)),
        ));
        let request: ProxyRequest = serde_json::from_value(
            json!({"serverName": "A", "action": "callTool", "toolName": "send_email"}),
        )
        .unwrap();
        let prepared = gateway.prepare(&request).unwrap();
        let mut rx = StreamEmitter::spawn(gateway, prepared);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        let chunks: Vec<&Value> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Chunk { data } => Some(data),
                _ => None,
            })
            .collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], &json!({"result": {"output": "{\n  \"sent\": true\n}"}}));
        assert_eq!(chunks[1], &json!({"raw": "keepalive"}));
        let rendered = json!({"result": {"output": "[\n  \"a\",\n  \"b\"\n]"}});
        assert_eq!(chunks[2], &rendered);
        assert!(events.contains(&StreamEvent::Complete { data: rendered }));
    }

    #[tokio::test]
    async fn test_empty_stream_completes_with_empty_envelope() {
        let events = collect(FakeReply::Stream(vec![]), list_tools()).await;
        assert_eq!(
            events[2],
            StreamEvent::Complete { data: json!({"result": {"tools": []}}) }
        );
        assert_eq!(terminal_count(&events), 1);
    }

    #[tokio::test]
    async fn test_mislabeled_stream_is_a_document() {
        let events = collect(
            FakeReply::Frames("data: {\"result\":{\"content\":[]}}\n\n"),
            json!({"serverName": "A", "action": "callTool", "toolName": "x"}),
        )
        .await;
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[1],
            StreamEvent::Complete { data: json!({"result": {"output": {"content": []}}}) }
        );
    }

    #[tokio::test]
    async fn test_upstream_failure_single_error() {
        let events = collect(
            FakeReply::Fail(McpError::Timeout {
                url: "http://a.example/mcp".into(),
                timeout_secs: 60,
            }),
            list_tools(),
        )
        .await;
        assert_eq!(events.len(), 2);
        match &events[1] {
            StreamEvent::Error { error, details } => {
                assert_eq!(error, UPSTREAM_FAILURE);
                assert!(details.as_deref().unwrap().contains("timed out"));
            }
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mid_stream_failure_ends_with_error() {
        let events = collect(
            FakeReply::Stream(vec![
                Ok(ParsedFrame::Parsed(json!({"tools": []}))),
                Err(McpError::StreamError {
                    url: "http://a.example/mcp".into(),
                    reason: "connection reset".into(),
                }),
            ]),
            list_tools(),
        )
        .await;
        assert!(matches!(events.last(), Some(StreamEvent::Error { .. })));
        assert_eq!(terminal_count(&events), 1);
    }

    #[tokio::test]
    async fn test_stops_when_client_leaves() {
        let gateway = Arc::new(gateway_with(
            FakeTransport::new(vec![FakeReply::Document(json!({}))]),
            None,
        ));
        let request: ProxyRequest = serde_json::from_value(list_tools()).unwrap();
        let prepared = gateway.prepare(&request).unwrap();

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        drop(rx);
        let mut emitter = StreamEmitter::new(gateway, tx);
        assert!(!emitter.emit(StreamEvent::status("x")).await);
        assert_eq!(emitter.state(), EmitterState::Closed);

        // A fresh emitter with no listener returns without sending upstream.
        let transport = FakeTransport::new(vec![]);
        let gateway = Arc::new(gateway_with(Arc::clone(&transport), None));
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        drop(rx);
        StreamEmitter::new(gateway, tx).run(prepared).await;
        assert!(transport.sent().is_empty());
    }
}
