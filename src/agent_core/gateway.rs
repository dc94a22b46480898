//! McpGateway: the proxy facade shared by every HTTP handler.
//!
//! Resolves the upstream target, builds the JSON-RPC payload, sends it, and
//! shapes whatever comes back into the canonical envelope for the action.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use serde_json::{json, Value};

use super::types::ProxyRequest;
use crate::inference::humanizer::{is_structured, OutputHumanizer};
use crate::mcp_client::frames::ParsedFrame;
use crate::mcp_client::normalize::{normalize_tool_call, normalize_tools, PARSE_ERROR_KEY};
use crate::mcp_client::{
    build_call, CallKind, McpError, OutgoingCall, RawResponse, RpcIdAllocator, ServerRegistry,
    Transport,
};

/// Diagnostic attached when no frame of an event-stream body parsed.
pub const FRAME_PARSE_FAILURE: &str = "could not parse event-stream data";

/// A validated call ready to be sent.
#[derive(Debug, Clone)]
pub struct PreparedCall {
    pub url: String,
    pub call: OutgoingCall,
    pub headers: HashMap<String, String>,
}

impl PreparedCall {
    pub fn kind(&self) -> CallKind {
        self.call.kind
    }
}

/// Process-lifetime gateway state: the read-only registry, the shared id
/// counter, and the transport.
pub struct McpGateway {
    registry: ServerRegistry,
    transport: Arc<dyn Transport>,
    ids: RpcIdAllocator,
    humanizer: Option<Arc<dyn OutputHumanizer>>,
}

impl McpGateway {
    pub fn new(
        registry: ServerRegistry,
        transport: Arc<dyn Transport>,
        humanizer: Option<Arc<dyn OutputHumanizer>>,
    ) -> Self {
        Self {
            registry,
            transport,
            ids: RpcIdAllocator::new(),
            humanizer,
        }
    }

    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    // ─── Preparation ────────────────────────────────────────────────────

    /// Pick the upstream URL: an explicit `url` wins over `server_name`.
    pub fn resolve_target(
        &self,
        url: Option<&str>,
        server_name: Option<&str>,
    ) -> Result<String, McpError> {
        if let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) {
            return Ok(url.to_string());
        }
        match server_name.filter(|n| !n.trim().is_empty()) {
            Some(name) => self.registry.resolve(name).map(str::to_string),
            None => Err(McpError::validation("Missing MCP webhook URL or serverName")),
        }
    }

    /// Validate a client request and build its upstream payload.
    pub fn prepare(&self, req: &ProxyRequest) -> Result<PreparedCall, McpError> {
        let url = self.resolve_target(req.url.as_deref(), req.server_name.as_deref())?;
        let call = build_call(
            &self.ids,
            req.action.as_deref(),
            req.tool_name.as_deref(),
            req.args.clone(),
            req.raw_payload.clone(),
        )?;
        Ok(PreparedCall {
            url,
            call,
            headers: req.headers.clone(),
        })
    }

    // ─── Sending ────────────────────────────────────────────────────────

    /// Send a prepared call. With `streaming`, a declared event-stream comes
    /// back as a live frame stream.
    pub async fn send(
        &self,
        prepared: &PreparedCall,
        streaming: bool,
    ) -> Result<RawResponse, McpError> {
        let rpc_id = prepared.call.payload.get("id").cloned().unwrap_or_default();
        tracing::info!(
            url = %prepared.url,
            rpc_id = %rpc_id,
            kind = ?prepared.kind(),
            streaming,
            "sending MCP request"
        );
        self.transport
            .send(
                &prepared.url,
                &prepared.call.payload,
                &prepared.headers,
                streaming,
            )
            .await
    }

    /// Send a prepared call and reduce the response to one upstream document.
    pub async fn fetch_document(&self, prepared: &PreparedCall) -> Result<Value, McpError> {
        match self.send(prepared, false).await? {
            RawResponse::Document(doc) => Ok(doc),
            RawResponse::Frames { frames, text } => Ok(document_from_frames(frames, text)),
            RawResponse::Stream(mut stream) => {
                let mut frames = Vec::new();
                while let Some(frame) = stream.next().await {
                    frames.push(frame?);
                }
                Ok(document_from_frames(frames, String::new()))
            }
        }
    }

    /// Buffered proxy call: the shaped envelope for the request's action.
    pub async fn call(&self, req: &ProxyRequest) -> Result<Value, McpError> {
        let prepared = self.prepare(req)?;
        let doc = self.fetch_document(&prepared).await?;
        Ok(self.shape_document(prepared.kind(), doc).await)
    }

    // ─── Shaping ────────────────────────────────────────────────────────

    /// Normalize an upstream document for `kind`, humanizing structured
    /// tool-call output when a humanizer is configured.
    pub async fn shape_document(&self, kind: CallKind, doc: Value) -> Value {
        match kind {
            CallKind::Passthrough => doc,
            CallKind::ListTools => normalize_tools(doc),
            CallKind::CallTool => self.humanize(normalize_tool_call(doc)).await,
        }
    }

    /// Shape one streamed frame. Unparsable frames are forwarded as
    /// `{"raw": text}` without normalization.
    pub async fn shape_frame(&self, kind: CallKind, frame: ParsedFrame) -> Value {
        match frame {
            ParsedFrame::Parsed(doc) => self.shape_document(kind, doc).await,
            raw @ ParsedFrame::Raw(_) => raw.into_document(),
        }
    }

    async fn humanize(&self, mut envelope: Value) -> Value {
        let Some(humanizer) = &self.humanizer else {
            return envelope;
        };
        if let Some(output) = envelope
            .get_mut("result")
            .and_then(|r| r.get_mut("output"))
        {
            if is_structured(output) {
                *output = Value::String(humanizer.convert(output).await);
            }
        }
        envelope
    }
}

/// Reduce buffered event-stream frames to one document: the first frame that
/// parsed, otherwise the raw text with a parse-error marker.
pub fn document_from_frames(frames: Vec<ParsedFrame>, text: String) -> Value {
    frames
        .iter()
        .find_map(ParsedFrame::as_document)
        .cloned()
        .unwrap_or_else(|| {
            tracing::warn!("no event-stream frame could be parsed");
            json!({ "raw": text, PARSE_ERROR_KEY: FRAME_PARSE_FAILURE })
        })
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use crate::inference::PrettyJsonHumanizer;

    /// Canned upstream behavior for one call.
    pub(crate) enum FakeReply {
        Document(Value),
        /// A buffered body with event-stream framing.
        Frames(&'static str),
        /// A live event stream.
        Stream(Vec<Result<ParsedFrame, McpError>>),
        Fail(McpError),
    }

    /// Transport that replays scripted replies and records payloads.
    #[derive(Default)]
    pub(crate) struct FakeTransport {
        replies: Mutex<VecDeque<FakeReply>>,
        pub(crate) sent: Mutex<Vec<(String, Value)>>,
    }

    impl FakeTransport {
        pub(crate) fn new(replies: Vec<FakeReply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                sent: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn sent(&self) -> Vec<(String, Value)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(
            &self,
            url: &str,
            payload: &Value,
            _headers: &HashMap<String, String>,
            streaming: bool,
        ) -> Result<RawResponse, McpError> {
            self.sent
                .lock()
                .unwrap()
                .push((url.to_string(), payload.clone()));
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(FakeReply::Document(json!({})));
            match reply {
                FakeReply::Document(doc) => Ok(RawResponse::Document(doc)),
                FakeReply::Frames(text) => Ok(RawResponse::Frames {
                    frames: crate::mcp_client::frames::parse_frames(text),
                    text: text.to_string(),
                }),
                FakeReply::Stream(items) if streaming => {
                    Ok(RawResponse::Stream(Box::pin(futures::stream::iter(items))))
                }
                FakeReply::Stream(items) => Ok(RawResponse::Frames {
                    frames: items.into_iter().filter_map(Result::ok).collect(),
                    text: String::new(),
                }),
                FakeReply::Fail(e) => Err(e),
            }
        }
    }

    pub(crate) fn gateway_with(
        transport: Arc<FakeTransport>,
        humanizer: Option<Arc<dyn OutputHumanizer>>,
    ) -> McpGateway {
        McpGateway::new(
            ServerRegistry::new([("A", "http://a.example/mcp")]),
            transport,
            humanizer,
        )
    }

    fn request(value: Value) -> ProxyRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_resolve_target_prefers_url() {
        let gw = gateway_with(FakeTransport::new(vec![]), None);
        assert_eq!(
            gw.resolve_target(Some("http://direct/mcp"), Some("A")).unwrap(),
            "http://direct/mcp"
        );
        assert_eq!(
            gw.resolve_target(None, Some("unknown")).unwrap(),
            "http://a.example/mcp"
        );
        assert!(gw.resolve_target(None, None).unwrap_err().is_client_error());
        assert!(gw.resolve_target(Some(""), Some("")).unwrap_err().is_client_error());
    }

    #[tokio::test]
    async fn test_list_tools_end_to_end() {
        let transport = FakeTransport::new(vec![FakeReply::Document(json!({
            "tools": [{"name": "send_email", "description": "Send an email"}]
        }))]);
        let gw = gateway_with(Arc::clone(&transport), None);

        let envelope = gw
            .call(&request(json!({"serverName": "A", "action": "listTools"})))
            .await
            .unwrap();
        assert_eq!(
            envelope,
            json!({"result": {"tools": [{"name": "send_email", "description": "Send an email"}]}})
        );

        let sent = transport.sent();
        assert_eq!(sent[0].0, "http://a.example/mcp");
        assert_eq!(sent[0].1["method"], "tools/list");
    }

    #[tokio::test]
    async fn test_ids_increase_per_call() {
        let transport = FakeTransport::new(vec![]);
        let gw = gateway_with(Arc::clone(&transport), None);
        let req = request(json!({"serverName": "A", "action": "listTools"}));
        gw.call(&req).await.unwrap();
        gw.call(&req).await.unwrap();
        let sent = transport.sent();
        assert_eq!(sent[0].1["id"], "1");
        assert_eq!(sent[1].1["id"], "2");
    }

    #[tokio::test]
    async fn test_call_tool_humanized() {
        let transport = FakeTransport::new(vec![FakeReply::Document(json!({
            "jsonrpc": "2.0", "id": "1", "result": {"sent": true}
        }))]);
        let gw = gateway_with(transport, Some(Arc::new(PrettyJsonHumanizer)));
        let envelope = gw
            .call(&request(json!({
                "url": "http://x/mcp", "action": "callTool", "toolName": "send_email"
            })))
            .await
            .unwrap();
        assert_eq!(envelope, json!({"result": {"output": "{\n  \"sent\": true\n}"}}));
    }

    #[tokio::test]
    async fn test_scalar_output_not_humanized() {
        let transport = FakeTransport::new(vec![FakeReply::Document(json!({"result": "plain"}))]);
        let gw = gateway_with(transport, Some(Arc::new(PrettyJsonHumanizer)));
        let envelope = gw.shape_document(CallKind::CallTool, json!({"result": "plain"})).await;
        assert_eq!(envelope, json!({"result": {"output": "plain"}}));
    }

    #[tokio::test]
    async fn test_sniffed_frames_first_parsed_wins() {
        let transport = FakeTransport::new(vec![FakeReply::Frames(
            "event: message\ndata: oops\n\ndata: {\"result\":{\"tools\":[{\"name\":\"t\"}]}}\n\ndata: {\"ignored\":true}\n",
        )]);
        let gw = gateway_with(transport, None);
        let envelope = gw
            .call(&request(json!({"serverName": "A", "action": "listTools"})))
            .await
            .unwrap();
        assert_eq!(envelope, json!({"result": {"tools": [{"name": "t"}]}}));
    }

    #[tokio::test]
    async fn test_unparsable_frames_degrade() {
        let transport = FakeTransport::new(vec![FakeReply::Frames("data: nope\n\n")]);
        let gw = gateway_with(transport, None);
        let envelope = gw
            .call(&request(json!({"serverName": "A", "action": "callTool", "toolName": "x"})))
            .await
            .unwrap();
        assert_eq!(
            envelope,
            json!({"result": {"output": {"error": FRAME_PARSE_FAILURE}}})
        );
    }

    #[tokio::test]
    async fn test_raw_payload_passthrough() {
        let upstream = json!({"jsonrpc": "2.0", "result": {"resources": []}});
        let transport = FakeTransport::new(vec![FakeReply::Document(upstream.clone())]);
        let gw = gateway_with(Arc::clone(&transport), None);
        let raw = json!({"jsonrpc": "2.0", "id": "x", "method": "resources/list"});
        let envelope = gw
            .call(&request(json!({"url": "http://x/mcp", "rawPayload": raw.clone()})))
            .await
            .unwrap();
        assert_eq!(envelope, upstream);
        assert_eq!(transport.sent()[0].1, raw);
    }

    #[tokio::test]
    async fn test_validation_sends_nothing() {
        let transport = FakeTransport::new(vec![]);
        let gw = gateway_with(Arc::clone(&transport), None);
        let err = gw
            .call(&request(json!({"serverName": "A", "action": "callTool"})))
            .await
            .unwrap_err();
        assert!(err.is_client_error());
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let transport = FakeTransport::new(vec![FakeReply::Fail(McpError::Timeout {
            url: "http://a.example/mcp".into(),
            timeout_secs: 60,
        })]);
        let gw = gateway_with(transport, None);
        let err = gw
            .call(&request(json!({"serverName": "A", "action": "listTools"})))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_shape_raw_frame_is_opaque() {
        let gw = gateway_with(FakeTransport::new(vec![]), None);
        let shaped = gw
            .shape_frame(CallKind::ListTools, ParsedFrame::Raw("partial".into()))
            .await;
        assert_eq!(shaped, json!({"raw": "partial"}));
    }
}
