//! Event-stream frame parser.
//!
//! Upstream MCP servers answer either with a single JSON document or with
//! `text/event-stream` framing, where each meaningful line carries a
//! `data:` prefix. This module turns such text into [`ParsedFrame`]s, both
//! for a fully buffered body ([`parse_frames`]) and incrementally from a live
//! byte stream ([`frame_stream`]), yielding each frame as soon as its line is
//! complete.

use std::collections::VecDeque;

use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};

use super::errors::McpError;

/// Line marker for event-stream payload lines.
const DATA_MARKER: &str = "data:";

/// One decoded `data:` line.
///
/// Serializes as `{"parsed": <document>}` or `{"raw": "<line text>"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParsedFrame {
    /// The line payload was valid JSON.
    Parsed(serde_json::Value),
    /// The line payload could not be parsed; carried through verbatim.
    Raw(String),
}

impl ParsedFrame {
    /// The parsed document, if this frame held valid JSON.
    pub fn as_document(&self) -> Option<&serde_json::Value> {
        match self {
            ParsedFrame::Parsed(v) => Some(v),
            ParsedFrame::Raw(_) => None,
        }
    }

    /// The opaque document forwarded for this frame: the parsed JSON, or
    /// `{"raw": text}` for unparsable content.
    pub fn into_document(self) -> serde_json::Value {
        match self {
            ParsedFrame::Parsed(v) => v,
            ParsedFrame::Raw(text) => serde_json::json!({ "raw": text }),
        }
    }
}

// ─── Line decoding ───────────────────────────────────────────────────────────

/// Decode a single line. Returns `None` for lines outside the `data:`
/// convention (comments, `event:` lines, blank separators) and for empty
/// payloads.
pub fn parse_line(line: &str) -> Option<ParsedFrame> {
    let payload = line.trim().strip_prefix(DATA_MARKER)?.trim();
    if payload.is_empty() {
        return None;
    }

    match serde_json::from_str(payload) {
        Ok(doc) => Some(ParsedFrame::Parsed(doc)),
        Err(e) => {
            tracing::debug!(error = %e, data = %payload, "unparsable event-stream frame");
            Some(ParsedFrame::Raw(payload.to_string()))
        }
    }
}

/// Parse a fully buffered event-stream body into frames, in order.
pub fn parse_frames(text: &str) -> Vec<ParsedFrame> {
    text.split('\n').filter_map(parse_line).collect()
}

/// Whether a body declared as something else actually uses event-stream
/// framing: it starts with an `event:` marker or has a `data:` line.
pub fn looks_like_event_stream(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with("event:")
        || text
            .lines()
            .any(|line| line.trim_start().starts_with(DATA_MARKER))
}

// ─── Incremental decoder ─────────────────────────────────────────────────────

/// Incremental line decoder for a chunked byte stream.
///
/// Bytes are buffered until a `\n` is seen, so multi-byte UTF-8 sequences
/// split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and return every frame completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ParsedFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            if let Some(frame) = parse_line(&text) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<ParsedFrame> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest))
    }
}

/// Adapt a live byte stream into a stream of frames.
///
/// Each frame is produced as soon as its line boundary arrives; the body is
/// never buffered in full. A read error ends the stream after yielding the
/// error produced by `on_error`.
pub fn frame_stream<S, B, E, F>(
    bytes: S,
    on_error: F,
) -> impl Stream<Item = Result<ParsedFrame, McpError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Send,
    F: Fn(E) -> McpError + Send + 'static,
{
    let state = (
        Box::pin(bytes),
        FrameDecoder::new(),
        VecDeque::new(),
        false,
        on_error,
    );

    stream::unfold(
        state,
        |(mut bytes, mut decoder, mut pending, mut done, on_error)| async move {
            loop {
                if let Some(frame) = pending.pop_front() {
                    return Some((Ok(frame), (bytes, decoder, pending, done, on_error)));
                }
                if done {
                    return None;
                }

                match bytes.next().await {
                    Some(Ok(chunk)) => pending.extend(decoder.push(chunk.as_ref())),
                    Some(Err(e)) => {
                        done = true;
                        pending.clear();
                        let error = on_error(e);
                        return Some((Err(error), (bytes, decoder, pending, done, on_error)));
                    }
                    None => {
                        done = true;
                        pending.extend(decoder.finish());
                    }
                }
            }
        },
    )
}

// ─── Tests ───────────────────────────────────────────────────────────────────
