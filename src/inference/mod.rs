//! Inference: OpenAI-compatible model clients used around the gateway.
//!
//! This module handles the best-effort collaborators of the proxy:
//! - Non-streaming chat completions
//! - Output humanization (pretty JSON or model summary)
//! - Conversation title generation (heuristic or model)
//! - Speech-to-text transcription
//!
//! Every collaborator degrades gracefully: a model failure falls back to a
//! local rendering instead of failing the request.

pub mod client;
pub mod errors;
pub mod humanizer;
pub mod title;
pub mod transcriber;
pub mod types;

// Re-exports for convenience
pub use client::InferenceClient;
pub use errors::InferenceError;
pub use humanizer::{LlmHumanizer, OutputHumanizer, PrettyJsonHumanizer};
pub use title::{HeuristicTitleGenerator, LlmTitleGenerator, TitleGenerator};
pub use transcriber::{HttpTranscriber, SpeechTranscriber};
pub use types::{ChatMessage, Role};
