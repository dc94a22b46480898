//! Shared types for the MCP gateway client.
//!
//! JSON-RPC 2.0 request shape and the MCP tool descriptor fields the gateway
//! reads.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// JSON-RPC method for tool discovery.
pub const METHOD_TOOLS_LIST: &str = "tools/list";

/// JSON-RPC method for tool invocation.
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// JSON-RPC 2.0 request message sent upstream.
///
/// The id is a string drawn from the process-wide allocator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    pub params: serde_json::Value,
}

impl RpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: String, method: &str, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

// ─── MCP Protocol Types ──────────────────────────────────────────────────────

/// Tool descriptor as returned by an upstream `tools/list`.
///
/// Only the fields below are interpreted; everything else is carried through
/// as opaque JSON by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "inputSchema", alias = "input_schema")]
    pub input_schema: InputSchema,
}

/// JSON-schema subset read from a tool's `inputSchema`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

/// A single parameter in a tool's input schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(default, rename = "type")]
    pub kind: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
}

/// One upstream entry in the `mcpServers` configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub url: String,
}

/// The `mcpServers` section, kept in the order the file lists it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerMap {
    entries: Vec<(String, ServerEntry)>,
}

impl ServerMap {
    /// Add or replace an entry. A replaced entry keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, entry: ServerEntry) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = entry,
            None => self.entries.push((name, entry)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ServerEntry> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, e)| e)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ServerEntry)> {
        self.entries.iter().map(|(n, e)| (n.as_str(), e))
    }
}

impl<N: Into<String>> FromIterator<(N, ServerEntry)> for ServerMap {
    fn from_iter<I: IntoIterator<Item = (N, ServerEntry)>>(iter: I) -> Self {
        let mut servers = ServerMap::default();
        for (name, entry) in iter {
            servers.insert(name, entry);
        }
        servers
    }
}

impl<'de> Deserialize<'de> for ServerMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ServerMapVisitor;

        impl<'de> Visitor<'de> for ServerMapVisitor {
            type Value = ServerMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of server names to entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<ServerMap, A::Error> {
                let mut servers = ServerMap::default();
                while let Some((name, entry)) = map.next_entry::<String, ServerEntry>()? {
                    servers.insert(name, entry);
                }
                Ok(servers)
            }
        }

        deserializer.deserialize_map(ServerMapVisitor)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
