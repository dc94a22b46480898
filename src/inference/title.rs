//! Conversation title generation.

use async_trait::async_trait;

use super::client::InferenceClient;
use super::types::ChatMessage;

/// Title returned when nothing usable remains.
pub const FALLBACK_TITLE: &str = "New Chat";

const MAX_TITLE_WORDS: usize = 5;

const STOP_WORDS: &[&str] = &[
    "how", "what", "when", "where", "why", "who", "can", "could", "would", "should",
];

const TITLE_PROMPT: &str = "\
You are a title generator. Create a concise, descriptive title for the given user query.

RULES:
- Maximum 5 words
- Be specific and descriptive
- No quotes or special characters
- Capture the main topic/intent
- Use title case

Examples:
Query: \"How do I deploy a Docker container to AWS?\"
Title: \"Docker AWS Deployment Guide\"

Query: \"What's the difference between React and Vue?\"
Title: \"React vs Vue Comparison\"

Query: \"Send an email to john@example.com about the meeting\"
Title: \"Email Meeting Notification\"";

/// Produces a short title for a chat query. Never fails.
#[async_trait]
pub trait TitleGenerator: Send + Sync {
    /// `provider` is the client's preferred model provider; implementations
    /// may ignore it.
    async fn generate_title(&self, text: &str, provider: &str) -> String;
}

// ─── Heuristic ───────────────────────────────────────────────────────────────

/// Title built from the first few words of the query.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTitleGenerator;

#[async_trait]
impl TitleGenerator for HeuristicTitleGenerator {
    async fn generate_title(&self, text: &str, _provider: &str) -> String {
        heuristic_title(text)
    }
}

/// First three words minus question words (keeping the first two if all are
/// question words), alphanumerics only, title-cased.
pub fn heuristic_title(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().take(3).collect();
    if words.is_empty() {
        return FALLBACK_TITLE.to_string();
    }

    let mut kept: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| !STOP_WORDS.contains(&w.to_lowercase().as_str()))
        .collect();
    if kept.is_empty() {
        kept = words.into_iter().take(2).collect();
    }

    let joined: String = kept
        .join(" ")
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let title = title_case(&joined);
    if title.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        title
    }
}

/// Normalize a model-produced title: strip quotes and a `Title:` prefix,
/// keep at most five words, title-case.
pub fn clean_title(raw: &str) -> String {
    let strip_quotes = |s: &str| s.trim().trim_matches(|c| c == '"' || c == '\'').trim().to_string();

    let mut title = strip_quotes(raw);
    if title.get(..6).is_some_and(|p| p.eq_ignore_ascii_case("title:")) {
        title = strip_quotes(&title[6..]);
    }

    let words: Vec<&str> = title.split_whitespace().take(MAX_TITLE_WORDS).collect();
    if words.is_empty() {
        return FALLBACK_TITLE.to_string();
    }
    title_case(&words.join(" "))
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

// ─── LLM ─────────────────────────────────────────────────────────────────────

/// Title from a chat-completion model, falling back to the heuristic.
pub struct LlmTitleGenerator {
    client: InferenceClient,
}

impl LlmTitleGenerator {
    pub fn new(client: InferenceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TitleGenerator for LlmTitleGenerator {
    async fn generate_title(&self, text: &str, provider: &str) -> String {
        let messages = vec![
            ChatMessage::system(TITLE_PROMPT),
            ChatMessage::user(format!("Query: {text}\n\nTitle:")),
        ];
        match self.client.chat_completion(messages, 0.3, 20).await {
            Ok(reply) => clean_title(&reply),
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "title generation failed, using heuristic");
                heuristic_title(text)
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
