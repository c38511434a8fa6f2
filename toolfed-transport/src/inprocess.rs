//! In-process transport: a function table of locally registered handlers,
//! no framing, no concurrency hazard beyond the handler itself. Used for
//! the reserved `toolfedInternal` client and for embedding
//! applications that want to expose native Rust functions as tools.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use toolfed_core::{AgentContext, Result, ToolfedError, Tool, Transport, TransportToolResult};

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;
/// A locally-implemented tool handler. Receives the caller's [`AgentContext`]
/// verbatim (not just the arguments) so handlers that themselves dispatch
/// nested tool calls — the code-mode interpreter in `toolfed-agent` being
/// the motivating case — can honor the same deadline and context filters as
/// the outer invocation rather than fabricating a fresh one.
pub type Handler = Arc<dyn Fn(Value, AgentContext) -> HandlerFuture + Send + Sync>;

/// A raw handler that builds the [`TransportToolResult`] itself instead of
/// returning a JSON value to be re-serialized. Used by handlers whose
/// result content is not JSON at all — the code-mode tool's plaintext
/// execution report being the motivating case — where re-serializing
/// through `serde_json::to_string` would wrap the content in quotes and
/// escape it.
pub type RawHandlerFuture = Pin<Box<dyn Future<Output = Result<TransportToolResult>> + Send>>;
pub type RawHandler = Arc<dyn Fn(Value, AgentContext) -> RawHandlerFuture + Send + Sync>;

struct Registered {
    description: String,
    parameters_schema: Value,
    handler: RawHandler,
}

/// A registry of locally-implemented tool handlers, exposed through the
/// same [`Transport`] interface as a remote MCP server.
#[derive(Clone, Default)]
pub struct InProcessTransport {
    handlers: Arc<std::sync::RwLock<HashMap<String, Registered>>>,
}

impl InProcessTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `local_name` that returns a JSON value on
    /// success. Re-registering the same name replaces the previous handler.
    pub fn register<F, Fut>(&self, local_name: impl Into<String>, description: impl Into<String>, parameters_schema: Value, handler: F)
    where
        F: Fn(Value, AgentContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let wrapped: RawHandler = Arc::new(move |args, ctx| {
            let fut = handler(args, ctx);
            Box::pin(async move {
                match fut.await {
                    Ok(value) => Ok(TransportToolResult::ok(serde_json::to_string(&value)?)),
                    Err(ToolfedError::Cancelled) => Err(ToolfedError::Cancelled),
                    Err(e) => Ok(TransportToolResult::error(e.to_string())),
                }
            })
        });
        self.handlers.write().unwrap().insert(
            local_name.into(),
            Registered { description: description.into(), parameters_schema, handler: wrapped },
        );
    }

    /// Register a handler under `local_name` that builds the
    /// [`TransportToolResult`] (content + `is_error`) itself, bypassing the
    /// JSON re-serialization `register` applies. Re-registering the same
    /// name replaces the previous handler.
    pub fn register_raw<F, Fut>(&self, local_name: impl Into<String>, description: impl Into<String>, parameters_schema: Value, handler: F)
    where
        F: Fn(Value, AgentContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TransportToolResult>> + Send + 'static,
    {
        let wrapped: RawHandler = Arc::new(move |args, ctx| Box::pin(handler(args, ctx)));
        self.handlers.write().unwrap().insert(
            local_name.into(),
            Registered { description: description.into(), parameters_schema, handler: wrapped },
        );
    }

    pub fn unregister(&self, local_name: &str) {
        self.handlers.write().unwrap().remove(local_name);
    }

    pub fn local_names(&self) -> Vec<String> {
        self.handlers.read().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn connect(&self) -> Result<Vec<Tool>> {
        let guard = self.handlers.read().unwrap();
        Ok(guard
            .iter()
            .map(|(name, reg)| Tool::new("", name.clone(), reg.description.clone(), reg.parameters_schema.clone()))
            .collect())
    }

    async fn invoke(&self, local_name: &str, args: Value, ctx: &AgentContext) -> Result<TransportToolResult> {
        if ctx.is_cancelled() {
            return Err(ToolfedError::Cancelled);
        }
        let handler = {
            let guard = self.handlers.read().unwrap();
            guard.get(local_name).map(|r| r.handler.clone())
        };
        let handler = handler.ok_or_else(|| ToolfedError::ToolNotFound(local_name.to_string()))?;
        handler(args, ctx.clone()).await
    }

    async fn close(&self) {
        // No owned resources beyond the handler table itself.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_and_invoke_roundtrip() {
        let t = InProcessTransport::new();
        t.register("echo", "echoes input", serde_json::json!({}), |args, _ctx| async move { Ok(args) });

        let tools = t.connect().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].local_name, "echo");

        let ctx = AgentContext::new("r");
        let result = t.invoke("echo", serde_json::json!({"message": "hi"}), &ctx).await.unwrap();
        assert!(!result.is_error);
        assert_eq!(result.content, r#"{"message":"hi"}"#);
    }

    #[tokio::test]
    async fn unknown_handler_is_tool_not_found() {
        let t = InProcessTransport::new();
        let ctx = AgentContext::new("r");
        let result = t.invoke("missing", serde_json::json!({}), &ctx).await;
        assert!(matches!(result, Err(ToolfedError::ToolNotFound(_))));
    }

    #[tokio::test]
    async fn handler_error_becomes_error_result_not_invocation_error() {
        let t = InProcessTransport::new();
        t.register("boom", "always fails", serde_json::json!({}), |_args, _ctx| async move {
            Err(ToolfedError::Sandbox("kaboom".into()))
        });
        let ctx = AgentContext::new("r");
        let result = t.invoke("boom", serde_json::json!({}), &ctx).await.unwrap();
        assert!(result.is_error);
        assert!(result.content.contains("kaboom"));
    }

    #[tokio::test]
    async fn unregister_removes_tool() {
        let t = InProcessTransport::new();
        t.register("echo", "echo", serde_json::json!({}), |args, _ctx| async move { Ok(args) });
        t.unregister("echo");
        assert!(t.connect().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn register_raw_bypasses_json_reserialization() {
        let t = InProcessTransport::new();
        t.register_raw("report", "raw text report", serde_json::json!({}), |_args, _ctx| async move {
            Ok(TransportToolResult::error("Execution runtime error:\nboom"))
        });
        let ctx = AgentContext::new("r");
        let result = t.invoke("report", serde_json::json!({}), &ctx).await.unwrap();
        assert!(result.is_error);
        assert_eq!(result.content, "Execution runtime error:\nboom");
    }
}
