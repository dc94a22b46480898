//! Gateway configuration loading.
//!
//! Reads `config.json` (parsed as YAML, which accepts plain JSON) after
//! resolving `${VAR}` / `${VAR:-default}` environment references. A missing or
//! malformed file never aborts startup: the built-in single-server default is
//! used instead.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::mcp_client::types::{ServerEntry, ServerMap};
use crate::mcp_client::McpError;

/// Name of the server entry used when no configuration is available.
pub const DEFAULT_SERVER_NAME: &str = "Default";

/// Upstream URL of the built-in default entry.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:5000/mcp";

// ─── Public Types ────────────────────────────────────────────────────────────

/// Top-level gateway configuration (mirrors `config.json`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default)]
    pub mcp_servers: ServerMap,
    /// Pause between successive plan actions.
    #[serde(default = "default_plan_step_delay_ms")]
    pub plan_step_delay_ms: u64,
    #[serde(default)]
    pub humanizer: HumanizerConfig,
    /// Enables LLM-generated conversation titles when present.
    #[serde(default)]
    pub titles: Option<LlmEndpoint>,
    /// Enables `/speech-to-text` when present.
    #[serde(default)]
    pub transcription: Option<TranscriptionConfig>,
}

fn default_plan_step_delay_ms() -> u64 {
    500
}

/// How structured tool-call output is rendered for the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumanizerMode {
    /// Output is returned as structured JSON.
    #[default]
    None,
    /// Output is rendered as indented JSON text.
    Pretty,
    /// Output is summarized by a chat-completion model.
    Llm,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HumanizerConfig {
    #[serde(default)]
    pub mode: HumanizerMode,
    /// Required when `mode` is `llm`.
    #[serde(default)]
    pub llm: Option<LlmEndpoint>,
}

/// An OpenAI-compatible chat-completion endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmEndpoint {
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_llm_timeout_secs() -> u64 {
    10
}

impl LlmEndpoint {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// An OpenAI-compatible `/audio/transcriptions` endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionConfig {
    pub base_url: String,
    #[serde(default = "default_transcription_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_transcription_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

fn default_transcription_timeout_secs() -> u64 {
    60
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let mut mcp_servers = ServerMap::default();
        mcp_servers.insert(
            DEFAULT_SERVER_NAME,
            ServerEntry {
                url: DEFAULT_SERVER_URL.to_string(),
            },
        );
        Self {
            mcp_servers,
            plan_step_delay_ms: default_plan_step_delay_ms(),
            humanizer: HumanizerConfig::default(),
            titles: None,
            transcription: None,
        }
    }
}

impl GatewayConfig {
    pub fn plan_step_delay(&self) -> Duration {
        Duration::from_millis(self.plan_step_delay_ms)
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Load and parse a configuration file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, McpError> {
    let raw = std::fs::read_to_string(path).map_err(|e| McpError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    let interpolated = interpolate_env_vars(&raw);

    let config: GatewayConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| McpError::ConfigError {
            reason: format!("failed to parse config: {e}"),
        })?;

    Ok(config)
}

/// Load the configuration, degrading to [`GatewayConfig::default`] when the
/// file is missing, malformed, or names no servers.
pub fn load_or_default(path: &Path) -> GatewayConfig {
    match load_config(path) {
        Ok(config) if !config.mcp_servers.is_empty() => {
            tracing::info!(
                path = %path.display(),
                servers = ?config.mcp_servers.names().collect::<Vec<_>>(),
                "loaded gateway config"
            );
            config
        }
        Ok(config) => {
            tracing::warn!(path = %path.display(), "config has no mcpServers, using default server");
            GatewayConfig {
                mcp_servers: GatewayConfig::default().mcp_servers,
                ..config
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "using built-in default config");
            GatewayConfig::default()
        }
    }
}

// ─── Env var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` with values from the environment.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name).unwrap_or_else(|_| expand_tilde(default)),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
