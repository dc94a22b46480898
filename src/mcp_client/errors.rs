//! MCP gateway client error types.

use thiserror::Error;

/// Errors that can occur while building, sending, or reading an upstream
/// MCP call.
///
/// Malformed upstream bodies are not represented here: they degrade into a
/// `{"raw": …}` document instead of failing the call.
#[derive(Debug, Error)]
pub enum McpError {
    /// Server registry is empty or unusable.
    #[error("config error: {reason}")]
    ConfigError {
        reason: String,
    },

    /// A required request field is missing or invalid.
    #[error("validation error: {reason}")]
    Validation {
        reason: String,
    },

    /// The upstream did not answer within the fixed deadline.
    #[error("upstream '{url}' timed out after {timeout_secs}s")]
    Timeout {
        url: String,
        timeout_secs: u64,
    },

    /// Connection-level failure reaching the upstream.
    #[error("upstream '{url}' unreachable: {reason}")]
    Unreachable {
        url: String,
        reason: String,
    },

    /// The response body could not be read to completion.
    #[error("stream error from '{url}': {reason}")]
    StreamError {
        url: String,
        reason: String,
    },
}

impl McpError {
    /// Shorthand for a [`McpError::Validation`].
    pub fn validation(reason: impl Into<String>) -> Self {
        McpError::Validation {
            reason: reason.into(),
        }
    }

    /// Whether the error was caused by the caller's request rather than the
    /// upstream or the gateway itself.
    pub fn is_client_error(&self) -> bool {
        matches!(self, McpError::Validation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_is_client_error() {
        assert!(McpError::validation("missing toolName").is_client_error());
        assert!(!McpError::ConfigError {
            reason: "empty".into()
        }
        .is_client_error());
    }

    #[test]
    fn test_timeout_message() {
        let err = McpError::Timeout {
            url: "http://localhost:5000/mcp".into(),
            timeout_secs: 60,
        };
        assert_eq!(
            err.to_string(),
            "upstream 'http://localhost:5000/mcp' timed out after 60s"
        );
    }
}
