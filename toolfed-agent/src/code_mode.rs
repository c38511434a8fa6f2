//! The `executeToolCode` built-in tool: binds the sandboxed
//! interpreter in `toolfed-sandbox` to the live client federation, so a
//! guest program's `<client>.<tool>(args)` calls are routed back through
//! the same [`ToolInvoker`] (and therefore the same plugin chain and
//! allowlist) as any other tool call.
//!
//! Registered under the in-process client via
//! [`InProcessTransport::register_raw`] rather than `register`: the
//! execution report's text format (`"[Console output: ...]\n..."`) is the
//! literal wire content, and re-serializing it through `serde_json` would
//! quote and escape it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use toolfed_core::{qualify, AgentContext, Result as CoreResult, ToolCall, ToolResult, TransportToolResult};
use toolfed_invoker::ToolInvoker;
use toolfed_registry::ClientRegistry;
use toolfed_sandbox::{ClientBinding, ExecutionReport, SandboxExecutor, ToolBridge, ToolSpec};
use toolfed_transport::InProcessTransport;

/// The local (unqualified) name the code-mode tool is registered under.
/// Always auto-eligible at the agent-driver level: a caller
/// configuring the in-process client's `tools_to_auto_execute` should
/// include this name alongside `"*"` if it wants the full federation
/// auto-executed through code mode.
pub const CODE_MODE_TOOL_NAME: &str = "executeToolCode";

/// Routes a guest `<client>.<tool>(args)` call back through the
/// [`ToolInvoker`], under the same [`AgentContext`] the outer
/// `executeToolCode` call was made with — so the nested call honors the
/// same deadline and context filters, and honors the owning
/// client's `tools_to_execute` allowlist but never `tools_to_auto_execute`,
/// which is an agent-level policy inapplicable inside code.
struct InvokerBridge {
    invoker: Arc<ToolInvoker>,
    ctx: AgentContext,
}

#[async_trait]
impl ToolBridge for InvokerBridge {
    async fn call_tool(&self, client_name: &str, local_name: &str, arguments: Value) -> CoreResult<ToolResult> {
        let qualified_name = qualify(client_name, local_name);
        // A synthetic id: the result never reaches model history directly
        // (only the outer `executeToolCode` result does), so nothing reads
        // this id back.
        let call = ToolCall::new(Uuid::new_v4().to_string(), qualified_name, arguments);
        self.invoker.execute_tool_call(&self.ctx, &call).await
    }
}

/// Every connected client's tools visible to a code-mode program under the
/// current context: the same `tools_to_execute` (config ∩ context) view
/// `ClientRegistry::available_tools` already computes for any other
/// listing, grouped by owning client.
async fn client_bindings(registry: &ClientRegistry, ctx: &AgentContext) -> Vec<ClientBinding> {
    let tools = registry.available_tools(ctx).await;
    let mut by_client: BTreeMap<String, Vec<ToolSpec>> = BTreeMap::new();
    for tool in tools {
        by_client.entry(tool.client_name).or_default().push(ToolSpec { local_name: tool.local_name, description: tool.description });
    }
    by_client.into_iter().map(|(client_name, tools)| ClientBinding { client_name, tools }).collect()
}

/// Register `executeToolCode` on `in_process`, wiring it to `registry` and
/// `invoker` and bounding each execution's wall-clock by
/// `tool_execution_timeout`.
pub fn install_code_mode_tool(in_process: &InProcessTransport, registry: Arc<ClientRegistry>, invoker: Arc<ToolInvoker>, tool_execution_timeout: Duration) {
    in_process.register_raw(
        CODE_MODE_TOOL_NAME,
        "Execute a short JavaScript-like program over every connected tool in the federation. Each connected client is exposed as a global object whose methods invoke its tools, e.g. `await srv.echo({message: 'hi'})`. The program's return value becomes the tool result.",
        serde_json::json!({
            "type": "object",
            "properties": { "code": { "type": "string", "description": "The program source to execute." } },
            "required": ["code"],
        }),
        move |args, ctx| {
            let registry = registry.clone();
            let invoker = invoker.clone();
            async move {
                let code = match args.get("code").and_then(Value::as_str) {
                    Some(code) => code.to_string(),
                    None => {
                        let report = ExecutionReport::validation_error(&[], "argument 'code' (string) is required", "clients=[]");
                        return Ok(TransportToolResult { content: report.text, is_error: report.is_error });
                    }
                };

                let bindings = client_bindings(&registry, &ctx).await;
                let bridge: Arc<dyn ToolBridge> = Arc::new(InvokerBridge { invoker, ctx: ctx.clone() });
                let report = SandboxExecutor::new().execute(&code, bindings, bridge, tool_execution_timeout).await;
                debug!(is_error = report.is_error, "code-mode execution finished");
                Ok(TransportToolResult { content: report.text, is_error: report.is_error })
            }
        },
    );
}
