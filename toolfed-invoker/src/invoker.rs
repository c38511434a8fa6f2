//! `ToolInvoker`: the single chokepoint for executing one tool call.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use toolfed_core::{AgentContext, Result, ToolCall, ToolResult, ToolResultMessage, WireFormat};
use toolfed_plugin::{HookRequest, PluginChain};
use toolfed_registry::ClientRegistry;

/// Ties the registry, plugin chain, and per-call timeout together behind
/// `execute_tool_call`, the only path by which a tool is ever actually run.
pub struct ToolInvoker {
    registry: Arc<ClientRegistry>,
    plugins: Arc<PluginChain>,
    tool_execution_timeout: Duration,
}

impl ToolInvoker {
    pub fn new(registry: Arc<ClientRegistry>, plugins: Arc<PluginChain>, tool_execution_timeout: Duration) -> Self {
        Self { registry, plugins, tool_execution_timeout }
    }

    /// Execute one tool call end to end: resolve, filter, run the plugin
    /// chain, dispatch, and fold the outcome into a raw result.
    ///
    /// Errors local to this one call — unresolvable name, disconnected
    /// client, filtered tool, or a transport failure — are folded into an
    /// `is_error = true` `ToolResult` rather than propagated, since an
    /// error in one tool call should not abort the whole agent loop. Only
    /// `ToolfedError::is_fatal()` errors (cancellation, a plugin error
    /// during dispatch) propagate as `Err`.
    #[instrument(skip(self, ctx, call), fields(qualified_name = %call.qualified_name, id = %call.id))]
    pub async fn execute_tool_call(&self, ctx: &AgentContext, call: &ToolCall) -> Result<ToolResult> {
        match self.dispatch(ctx, call).await {
            Ok(transport_result) => {
                Ok(ToolResult { id: call.id.clone(), content: transport_result.content, is_error: transport_result.is_error })
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                debug!(error = %e, "tool call failed locally, folded into is_error result");
                Ok(ToolResult::error(call.id.clone(), e.to_string()))
            }
        }
    }

    /// As `execute_tool_call`, but adapts the result into the caller's wire
    /// format. The call id is preserved byte-for-byte regardless of format.
    pub async fn execute_and_adapt(&self, ctx: &AgentContext, call: &ToolCall, format: WireFormat) -> Result<ToolResultMessage> {
        let result = self.execute_tool_call(ctx, call).await?;
        Ok(ToolResultMessage::from_result(&result, format))
    }

    async fn dispatch(&self, ctx: &AgentContext, call: &ToolCall) -> Result<toolfed_core::TransportToolResult> {
        let resolved = self.registry.resolve_tool(ctx, &call.qualified_name).await?;
        let child_ctx = ctx.derive_for_tool_call(self.tool_execution_timeout);
        let dispatch_ctx = child_ctx.clone();
        let transport = resolved.transport;
        let req = HookRequest::new(resolved.client_name, resolved.local_name, call.arguments.clone());

        self.plugins
            .run(&child_ctx, req, move |req| async move { transport.invoke(&req.local_name, req.arguments, &dispatch_ctx).await })
            .await
    }
}
