//! # toolfed
//!
//! The MCP Tool Manager and Agent Execution Core: a facade assembling the
//! client federation registry, plugin chain, tool invoker, sandboxed
//! code-mode tool, and the agent driver behind one [`ToolManager`].
//!
//! An embedding application supplies its own LLM callables
//! ([`ChatLlm`]/[`ResponsesLlm`]) and tool server configurations
//! ([`ClientConfig`]); this crate mediates the rest: namespacing tools by
//! client, enforcing allowlists, running the plugin chain around every
//! dispatch, and driving the iterative tool-calling loop.
//!
//! ```no_run
//! # use std::time::Duration;
//! # async fn example() -> toolfed::Result<()> {
//! use toolfed::{ManagerConfig, ToolManager};
//!
//! let manager = ToolManager::new(ManagerConfig::default()).await?;
//!
//! // Register a native Rust tool under the reserved in-process client.
//! manager
//!     .register_native_tool("ping", "replies pong", serde_json::json!({}), |_args, _ctx| async move {
//!         Ok(serde_json::json!({"reply": "pong"}))
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use toolfed_agent::{AgentDriver, ChatAgentResult, ResponsesAgentResult};
pub use toolfed_agent::{AgentError, StopReason, CODE_MODE_TOOL_NAME};
use toolfed_core::IN_PROCESS_CLIENT_NAME;
pub use toolfed_core::{
    normalize_client_name, qualify, split_qualified, AgentContext, ChatLlm, ChatMessage, ChatRequest,
    ChatResponse, ClientConfig, ClientState, ConnectionState, ConnectionType, ContextFilter, EnvResolve,
    FinishReason, ManagerConfig, ResponsesItem, ResponsesLlm, ResponsesOutput, ResponsesRequest, Result,
    StdioConfig, Tool, ToolAllowlist, ToolCall, ToolResult, ToolResultMessage, ToolfedError, WireFormat,
};
use toolfed_invoker::ToolInvoker;
pub use toolfed_plugin::{HookRequest, Plugin, PluginChain, PreHookOutcome};
use toolfed_registry::{ClientRegistry, DefaultTransportFactory};
pub use toolfed_sandbox::{is_error_marker, is_success_marker};
use toolfed_transport::InProcessTransport;

/// Re-exports grouped by crate, for callers that prefer `toolfed::core::X`
/// over the flattened root re-exports above.
pub mod core {
    pub use toolfed_core::*;
}
pub mod agent {
    pub use toolfed_agent::*;
}
pub mod invoker {
    pub use toolfed_invoker::*;
}
pub mod plugin {
    pub use toolfed_plugin::*;
}
pub mod registry {
    pub use toolfed_registry::*;
}
pub mod sandbox {
    pub use toolfed_sandbox::*;
}
pub mod transport {
    pub use toolfed_transport::*;
}

/// The id `ToolManager` registers its own built-in in-process client under.
/// Distinct from [`IN_PROCESS_CLIENT_NAME`] (the client's *name*, used in
/// qualified tool names) — this is the registry's client *id*, used for
/// `EditClient`/`RemoveClient`/`ReconnectClient`.
pub const BUILTIN_IN_PROCESS_CLIENT_ID: &str = "toolfed-builtin-in-process";

/// Assembles the client registry, plugin chain, tool invoker, built-in
/// code-mode tool, and agent driver behind one handle.
///
/// Cheap to clone: every field is an `Arc` (or, for the in-process
/// transport, an `Arc`-backed handle table) — a `ToolManager` is meant to be
/// constructed once per gateway process and shared across requests.
#[derive(Clone)]
pub struct ToolManager {
    registry: Arc<ClientRegistry>,
    plugins: Arc<PluginChain>,
    invoker: Arc<ToolInvoker>,
    driver: Arc<AgentDriver>,
    in_process: InProcessTransport,
}

impl ToolManager {
    /// Build a manager with a freshly registered, always-connected
    /// in-process client (named [`IN_PROCESS_CLIENT_NAME`]) hosting the
    /// built-in `executeToolCode` tool. The in-process client's own
    /// allowlists are unrestricted: it exists to host built-ins and
    /// embedder-registered native tools, which are trusted by construction
    /// (unlike a remote MCP server's tool set, which a caller restricts via
    /// its own `ClientConfig`).
    pub async fn new(config: ManagerConfig) -> Result<Self> {
        let in_process = InProcessTransport::new();
        let factory = Arc::new(DefaultTransportFactory::new(in_process.clone()));
        let registry = Arc::new(ClientRegistry::new(factory));
        let plugins = Arc::new(PluginChain::new());
        let invoker = Arc::new(ToolInvoker::new(registry.clone(), plugins.clone(), config.tool_execution_timeout));

        toolfed_agent::install_code_mode_tool(&in_process, registry.clone(), invoker.clone(), config.tool_execution_timeout);

        registry
            .add_client(ClientConfig {
                id: BUILTIN_IN_PROCESS_CLIENT_ID.to_string(),
                name: IN_PROCESS_CLIENT_NAME.to_string(),
                connection_type: ConnectionType::InProcess,
                connection_string: None,
                stdio_config: None,
                headers: HashMap::new(),
                tools_to_execute: ToolAllowlist::allow_all(),
                tools_to_auto_execute: ToolAllowlist::allow_all(),
                is_code_mode_client: true,
            })
            .await?;

        let driver = Arc::new(AgentDriver::new(registry.clone(), invoker.clone(), config));

        Ok(Self { registry, plugins, invoker, driver, in_process })
    }

    /// Register a native Rust tool under the built-in in-process client,
    /// re-listing its inventory so the new tool is immediately resolvable.
    pub async fn register_native_tool<F, Fut>(
        &self,
        local_name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: Value,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(Value, AgentContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.in_process.register(local_name, description, parameters_schema, handler);
        self.registry.reconnect_client(BUILTIN_IN_PROCESS_CLIENT_ID).await
    }

    /// Remove a previously registered native tool and refresh the in-process
    /// inventory.
    pub async fn unregister_native_tool(&self, local_name: &str) -> Result<()> {
        self.in_process.unregister(local_name);
        self.registry.reconnect_client(BUILTIN_IN_PROCESS_CLIENT_ID).await
    }

    /// Register (connect to) a remote MCP client.
    pub async fn add_client(&self, config: ClientConfig) -> Result<()> {
        self.registry.add_client(config).await
    }

    /// Replace a client's configuration, reconnecting under the new settings.
    pub async fn edit_client(&self, id: &str, config: ClientConfig) -> Result<()> {
        self.registry.edit_client(id, config).await
    }

    /// Tear down and deregister a client.
    pub async fn remove_client(&self, id: &str) -> Result<()> {
        self.registry.remove_client(id).await
    }

    /// Explicit, caller-driven reconnect.
    pub async fn reconnect_client(&self, id: &str) -> Result<()> {
        self.registry.reconnect_client(id).await
    }

    /// Every registered client's current connection state and configuration.
    pub async fn clients(&self) -> Vec<ClientState> {
        self.registry.get_clients().await
    }

    /// Every tool visible under `ctx` across every connected client.
    pub async fn available_tools(&self, ctx: &AgentContext) -> Vec<Tool> {
        self.registry.available_tools(ctx).await
    }

    /// Register a plugin at the end of the chain (runs last among
    /// pre-hooks, first among post-hooks).
    pub fn register_plugin(&self, plugin: Arc<dyn Plugin>) {
        self.plugins.register(plugin);
    }

    /// Execute one tool call directly, bypassing the agent loop — the path
    /// a caller uses for a direct (non-agentic) invocation, or to execute
    /// an `approval`-pending call the agent loop returned for confirmation.
    pub async fn execute_tool_call(&self, ctx: &AgentContext, call: &ToolCall) -> Result<ToolResult> {
        self.invoker.execute_tool_call(ctx, call).await
    }

    /// As [`ToolManager::execute_tool_call`], adapted into `format`'s wire
    /// message shape.
    pub async fn execute_and_adapt(&self, ctx: &AgentContext, call: &ToolCall, format: WireFormat) -> Result<ToolResultMessage> {
        self.invoker.execute_and_adapt(ctx, call, format).await
    }

    /// Drive a Chat-format agent conversation to completion.
    pub async fn run_chat_agent(
        &self,
        ctx: &AgentContext,
        history: Vec<ChatMessage>,
        initial: ChatResponse,
        llm: &dyn ChatLlm,
    ) -> std::result::Result<ChatAgentResult, AgentError<ChatAgentResult>> {
        self.driver.run_chat(ctx, history, initial, llm).await
    }

    /// As [`ToolManager::run_chat_agent`], over the Responses wire format.
    pub async fn run_responses_agent(
        &self,
        ctx: &AgentContext,
        history: Vec<ResponsesItem>,
        initial: ResponsesOutput,
        llm: &dyn ResponsesLlm,
    ) -> std::result::Result<ResponsesAgentResult, AgentError<ResponsesAgentResult>> {
        self.driver.run_responses(ctx, history, initial, llm).await
    }

    /// The underlying client registry, for callers that need direct access
    /// (introspection dashboards, health exporters).
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    pub fn invoker(&self) -> &Arc<ToolInvoker> {
        &self.invoker
    }

    pub fn plugins(&self) -> &Arc<PluginChain> {
        &self.plugins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use toolfed_core::{ChatChoice, FinishReason};

    #[tokio::test]
    async fn manager_boots_with_code_mode_tool_available() {
        let manager = ToolManager::new(ManagerConfig::default()).await.unwrap();
        let ctx = AgentContext::new("r");
        let tools = manager.available_tools(&ctx).await;
        assert!(tools.iter().any(|t| t.local_name == toolfed_agent::CODE_MODE_TOOL_NAME));
    }

    #[tokio::test]
    async fn register_native_tool_is_immediately_invocable() {
        let manager = ToolManager::new(ManagerConfig::default()).await.unwrap();
        manager
            .register_native_tool("ping", "pongs back", serde_json::json!({}), |_args, _ctx| async move {
                Ok(serde_json::json!({"reply": "pong"}))
            })
            .await
            .unwrap();

        let ctx = AgentContext::new("r");
        let call = ToolCall::new("1", "toolfedInternal-ping", serde_json::json!({}));
        let result = manager.execute_tool_call(&ctx, &call).await.unwrap();
        assert!(!result.is_error);
        assert!(result.content.contains("pong"));
    }

    struct ScriptedLlm {
        responses: Mutex<Vec<ChatResponse>>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ChatLlm for ScriptedLlm {
        async fn generate(&self, _ctx: &AgentContext, _req: ChatRequest) -> Result<ChatResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.responses.lock().unwrap().remove(0))
        }
    }

    #[tokio::test]
    async fn agent_loop_runs_end_to_end_through_the_manager() {
        let manager = ToolManager::new(ManagerConfig::default()).await.unwrap();
        manager
            .register_native_tool("echo", "echoes", serde_json::json!({}), |args, _ctx| async move { Ok(args) })
            .await
            .unwrap();

        let ctx = AgentContext::new("req-1");
        let initial = ChatResponse {
            choices: vec![ChatChoice {
                finish_reason: FinishReason::ToolCalls,
                message: ChatMessage::assistant_tool_calls(vec![ToolCall::new("1", "toolfedInternal-echo", serde_json::json!({"x": 1}))]),
            }],
        };
        let llm = ScriptedLlm {
            responses: Mutex::new(vec![ChatResponse {
                choices: vec![ChatChoice { finish_reason: FinishReason::Stop, message: ChatMessage::assistant_text("done") }],
            }]),
            calls: AtomicU32::new(0),
        };

        let result = manager.run_chat_agent(&ctx, Vec::new(), initial, &llm).await.unwrap();
        assert_eq!(result.stop_reason, StopReason::Stop);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
        assert!(result.history.iter().any(|m| m.tool_call_id.as_deref() == Some("1")));
    }
}
