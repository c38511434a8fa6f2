//! HTTP transport: one request per invocation.
//!
//! Retries are deliberately not this transport's job — a single attempt,
//! with any network/IO failure surfaced as `ToolfedError::Transport`.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use toolfed_core::{AgentContext, Result, ToolfedError, Tool, Transport, TransportToolResult};
use tracing::{debug, warn};

use crate::rpc::{CallToolResult, JsonRpcRequest, JsonRpcResponse, ListToolsResult};

/// An HTTP-carried MCP client: one `reqwest::Client`, one base URL, merged
/// headers from the owning `ClientConfig`.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    headers: HashMap<String, String>,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, headers: HashMap<String, String>) -> Self {
        Self { client: reqwest::Client::new(), endpoint: endpoint.into(), headers }
    }

    async fn rpc_call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        let req = JsonRpcRequest::new(method, params);
        let mut builder = self.client.post(&self.endpoint).json(&req).timeout(timeout);
        for (k, v) in &self.headers {
            builder = builder.header(k, v);
        }

        let resp = builder.send().await.map_err(|e| {
            warn!(endpoint = %self.endpoint, method, error = %e, "http transport request failed");
            ToolfedError::Transport(e.to_string())
        })?;

        let parsed: JsonRpcResponse = resp.json().await.map_err(|e| ToolfedError::Transport(e.to_string()))?;

        if let Some(err) = parsed.error {
            return Err(ToolfedError::Transport(err.message));
        }

        parsed.result.ok_or_else(|| ToolfedError::Transport("empty JSON-RPC result".into()))
    }

    fn remaining_timeout(ctx: &AgentContext) -> Duration {
        match ctx.deadline() {
            Some(deadline) => {
                let now = tokio::time::Instant::now();
                if deadline <= now { Duration::from_millis(1) } else { deadline - now }
            }
            None => Duration::from_secs(30),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self) -> Result<Vec<Tool>> {
        debug!(endpoint = %self.endpoint, "connecting http mcp transport");
        let result = self.rpc_call("tools/list", serde_json::json!({}), Duration::from_secs(10)).await?;
        let parsed: ListToolsResult = serde_json::from_value(result)?;
        Ok(parsed
            .tools
            .into_iter()
            .map(|t| Tool::new("", t.name, t.description, t.input_schema))
            .collect())
    }

    async fn invoke(&self, local_name: &str, args: Value, ctx: &AgentContext) -> Result<TransportToolResult> {
        if ctx.is_cancelled() {
            return Err(ToolfedError::Cancelled);
        }

        let timeout = Self::remaining_timeout(ctx);
        let params = serde_json::json!({ "name": local_name, "arguments": args });

        let call_fut = self.rpc_call("tools/call", params, timeout);
        let result = match tokio::time::timeout(timeout, call_fut).await {
            Ok(inner) => inner?,
            Err(_) => return Err(ToolfedError::Cancelled),
        };

        let parsed: CallToolResult = serde_json::from_value(result)?;
        Ok(if parsed.is_error {
            TransportToolResult::error(parsed.joined_text())
        } else {
            TransportToolResult::ok(parsed.joined_text())
        })
    }

    async fn close(&self) {
        // A single `reqwest::Client` owns no per-call resources to release;
        // nothing to tear down.
    }
}
