//! Minimal JSON-RPC envelope shared by the HTTP, SSE and stdio transports.
//!
//! The MCP wire protocol itself is out of scope for this crate beyond this
//! client-side envelope: servers are expected to speak
//! JSON-RPC 2.0 `tools/list` and `tools/call` methods and return MCP-shaped
//! `CallToolResult` content.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self { jsonrpc: "2.0", id: next_id(), method: method.into(), params }
    }
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    #[allow(dead_code)]
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// `{name, description, inputSchema}` as declared by an MCP `tools/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct McpToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

#[derive(Debug, Deserialize)]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<McpToolDescriptor>,
}

/// One content block in an MCP `CallToolResult`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Join every text content block, matching how comparable MCP clients
    /// flatten multi-part tool output into one string.
    pub fn joined_text(&self) -> String {
        self.content.iter().filter(|c| c.kind == "text").map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic() {
        let a = next_id();
        let b = next_id();
        assert!(b > a);
    }

    #[test]
    fn call_tool_result_joins_text_blocks() {
        let result = CallToolResult {
            content: vec![
                ContentBlock { kind: "text".into(), text: "hello".into() },
                ContentBlock { kind: "text".into(), text: "world".into() },
            ],
            is_error: false,
        };
        assert_eq!(result.joined_text(), "hello\nworld");
    }
}
