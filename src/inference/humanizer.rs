//! Output humanizers: render structured tool-call output as readable text.

use async_trait::async_trait;
use serde_json::Value;

use super::client::InferenceClient;
use super::types::ChatMessage;

const SUMMARY_TEMPERATURE: f32 = 0.2;
const SUMMARY_MAX_TOKENS: u32 = 1024;

const SUMMARY_PROMPT: &str = "\
Convert the following JSON data into a clear, structured natural language summary.
Focus on information that would be most relevant to an end user.

Guidelines:
1. Identify the application or service type (LinkedIn, Gmail, etc.) from the JSON structure
2. Extract only the most important information for the end user
3. Organize information in a logical, hierarchical structure
4. Use clear section headings without markdown formatting
5. Exclude technical details like IDs and server information unless absolutely necessary
6. For emails: focus on sender, subject, date, and key content
7. For social media posts: focus on content, visibility, and success status
8. For other apps: identify the key action and result
9. Keep the summary concise but informative

Provide your response in this structured format:
[Application Type] Summary:
Status: [success/failure/other]
Key Action: [what was done]
Main Content: [primary information]
Additional Details: [other relevant info]
Result/Outcome: [what happened as a result]";

/// Converts a structured tool-call output into text.
///
/// Implementations never fail: on any internal error they return a plain
/// rendering of their input.
#[async_trait]
pub trait OutputHumanizer: Send + Sync {
    async fn convert(&self, output: &Value) -> String;
}

/// Whether `output` is structured enough to be humanized.
pub fn is_structured(output: &Value) -> bool {
    output.is_object() || output.is_array()
}

/// Plain rendering used as the universal fallback.
pub fn render_pretty(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

// ─── PrettyJsonHumanizer ─────────────────────────────────────────────────────

/// Renders output as indented JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrettyJsonHumanizer;

#[async_trait]
impl OutputHumanizer for PrettyJsonHumanizer {
    async fn convert(&self, output: &Value) -> String {
        render_pretty(output)
    }
}

// ─── LlmHumanizer ────────────────────────────────────────────────────────────

/// Summarizes output with a chat-completion model.
pub struct LlmHumanizer {
    client: InferenceClient,
}

impl LlmHumanizer {
    pub fn new(client: InferenceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OutputHumanizer for LlmHumanizer {
    async fn convert(&self, output: &Value) -> String {
        if !is_structured(output) {
            return render_pretty(output);
        }

        let messages = vec![
            ChatMessage::system(SUMMARY_PROMPT),
            ChatMessage::user(format!("JSON Data:\n{}", render_pretty(output))),
        ];

        match self
            .client
            .chat_completion(messages, SUMMARY_TEMPERATURE, SUMMARY_MAX_TOKENS)
            .await
        {
            Ok(text) => strip_markdown(&text),
            Err(e) => {
                tracing::warn!(model = %self.client.model(), error = %e, "humanizer failed, using JSON rendering");
                render_pretty(output)
            }
        }
    }
}

/// Remove markdown heading and emphasis markers.
fn strip_markdown(text: &str) -> String {
    text.replace("###", "")
        .replace("**", "")
        .replace('*', "")
        .trim()
        .to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
