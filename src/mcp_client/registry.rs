//! Server registry: resolves a logical server name to an upstream URL.
//!
//! The registry is built once from configuration and is read-only afterwards,
//! so it can be shared freely between request handlers.

use super::errors::McpError;
use super::types::ServerMap;

/// Immutable name → URL mapping for upstream MCP servers.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    /// Entries in registration order. The first entry is the fallback target.
    entries: Vec<(String, String)>,
}

impl ServerRegistry {
    /// Build a registry from `(name, url)` pairs, preserving their order.
    pub fn new<I, N, U>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, U)>,
        N: Into<String>,
        U: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(n, u)| (n.into(), u.into()))
                .collect(),
        }
    }

    /// Build a registry from the `mcpServers` configuration section. The
    /// first server listed in the file is the fallback entry.
    pub fn from_config(servers: &ServerMap) -> Self {
        Self::new(servers.iter().map(|(name, entry)| (name, entry.url.as_str())))
    }

    /// Resolve `name` to its configured URL.
    ///
    /// An unknown name falls back to the first registered entry so that a
    /// single-server deployment never needs to name its server. Only an empty
    /// registry is an error.
    pub fn resolve(&self, name: &str) -> Result<&str, McpError> {
        if name.trim().is_empty() {
            return Err(McpError::validation("server name must not be empty"));
        }

        if let Some((_, url)) = self.entries.iter().find(|(n, _)| n == name) {
            return Ok(url);
        }

        match self.entries.first() {
            Some((fallback, url)) => {
                tracing::warn!(
                    requested = %name,
                    fallback = %fallback,
                    "server not found in registry, using fallback entry"
                );
                Ok(url)
            }
            None => Err(McpError::ConfigError {
                reason: format!("server '{name}' not found and no servers are configured"),
            }),
        }
    }

    /// Registered server names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Number of registered servers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no servers are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
