//! The uniform transport interface: every transport
//! variant (HTTP, SSE, stdio, in-process) implements this capability set
//! behind tagged dispatch rather than a deep inheritance hierarchy.

use crate::context::AgentContext;
use crate::error::Result;
use crate::types::Tool;
use async_trait::async_trait;
use serde_json::Value;

/// One MCP tool invocation result as reported by the transport, prior to
/// any wire-format adaptation.
#[derive(Debug, Clone)]
pub struct TransportToolResult {
    pub content: String,
    pub is_error: bool,
}

impl TransportToolResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self { content: content.into(), is_error: false }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self { content: content.into(), is_error: true }
    }
}

/// A single MCP client connection over one transport carrier.
///
/// `client_name` identifies the owning client for qualifying tool names;
/// transports do not qualify names themselves — that is the registry's job.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the connection and perform the MCP handshake, returning
    /// the server's declared tool list (local names, unqualified).
    async fn connect(&self) -> Result<Vec<Tool>>;

    /// Invoke one local tool by name. The ctx deadline/cancellation must be
    /// honored: a call whose ctx cancels before completion fails with
    /// `ToolfedError::Cancelled`.
    async fn invoke(&self, local_name: &str, args: Value, ctx: &AgentContext) -> Result<TransportToolResult>;

    /// Tear down the connection and release any owned resources (child
    /// processes killed and reaped, SSE streams closed, etc).
    async fn close(&self);
}
