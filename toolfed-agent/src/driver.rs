//! `AgentDriver`: the iterative model/tool loop.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, instrument, warn};

use toolfed_core::{
    AgentContext, ChatLlm, ChatMessage, ChatRequest, ChatResponse, ManagerConfig, ResponsesItem,
    ResponsesLlm, ResponsesOutput, ResponsesRequest, ToolCall, ToolResult, ToolfedError,
};
use toolfed_invoker::ToolInvoker;
use toolfed_registry::ClientRegistry;

use crate::partition;
use crate::result::{AgentError, ChatAgentResult, ResponsesAgentResult, StopReason};

/// Drives one agent conversation to completion: extracts tool calls from
/// the model's latest turn, executes the admissible subset, refreshes
/// `request-id`, and re-invokes the model until a stop condition holds.
pub struct AgentDriver {
    registry: Arc<ClientRegistry>,
    invoker: Arc<ToolInvoker>,
    config: ManagerConfig,
}

impl AgentDriver {
    pub fn new(registry: Arc<ClientRegistry>, invoker: Arc<ToolInvoker>, config: ManagerConfig) -> Self {
        Self { registry, invoker, config }
    }

    /// Drive a Chat-format conversation starting from `initial`, the
    /// caller's already-made first model response. `history` is the
    /// request prefix the caller sent to produce `initial` — the driver
    /// only ever appends to it.
    #[instrument(skip(self, ctx, history, initial, llm))]
    pub async fn run_chat(
        &self,
        ctx: &AgentContext,
        mut history: Vec<ChatMessage>,
        initial: ChatResponse,
        llm: &dyn ChatLlm,
    ) -> Result<ChatAgentResult, AgentError<ChatAgentResult>> {
        ctx.capture_original_request_id();
        let mut response = initial;
        let mut iterations = 0u32;

        loop {
            if ctx.is_cancelled() {
                return Err(AgentError {
                    error: ToolfedError::Cancelled,
                    partial: ChatAgentResult { history, stop_reason: StopReason::Stop, iterations },
                });
            }

            let tool_calls = response.tool_calls();
            let assistant_message = response.choices.first().map(|c| c.message.clone()).unwrap_or_else(|| ChatMessage::assistant_text(""));

            if tool_calls.is_empty() {
                history.push(assistant_message);
                return Ok(ChatAgentResult { history, stop_reason: StopReason::Stop, iterations });
            }

            let classified = partition::classify(&self.registry, ctx, &tool_calls).await;
            let to_execute = partition::executable(&classified);

            history.push(assistant_message);

            let (results, fatal) = self.execute_batch(ctx, &to_execute).await;
            for result in &results {
                history.push(chat_tool_message(result));
            }

            if let Some(error) = fatal {
                return Err(AgentError { error, partial: ChatAgentResult { history, stop_reason: StopReason::Stop, iterations } });
            }

            if partition::has_approval(&classified) {
                debug!(iterations, "agent loop stopping for approval");
                return Ok(ChatAgentResult { history, stop_reason: StopReason::Approval, iterations });
            }

            if iterations >= self.config.max_agent_depth {
                debug!(iterations, "agent loop reached max depth");
                return Ok(ChatAgentResult { history, stop_reason: StopReason::DepthReached, iterations });
            }
            iterations += 1;

            self.refresh_request_id(ctx).await;

            response = llm.generate(ctx, ChatRequest { input: history.clone() }).await.map_err(|error| AgentError {
                partial: ChatAgentResult { history: history.clone(), stop_reason: StopReason::Stop, iterations },
                error,
            })?;
        }
    }

    /// As `run_chat`, over the Responses wire format.
    #[instrument(skip(self, ctx, history, initial, llm))]
    pub async fn run_responses(
        &self,
        ctx: &AgentContext,
        mut history: Vec<ResponsesItem>,
        initial: ResponsesOutput,
        llm: &dyn ResponsesLlm,
    ) -> Result<ResponsesAgentResult, AgentError<ResponsesAgentResult>> {
        ctx.capture_original_request_id();
        let mut response = initial;
        let mut iterations = 0u32;

        loop {
            if ctx.is_cancelled() {
                return Err(AgentError {
                    error: ToolfedError::Cancelled,
                    partial: ResponsesAgentResult { history, stop_reason: StopReason::Stop, iterations },
                });
            }

            let tool_calls = response.tool_calls();

            if tool_calls.is_empty() {
                history.extend(response.output.clone());
                return Ok(ResponsesAgentResult { history, stop_reason: StopReason::Stop, iterations });
            }

            let classified = partition::classify(&self.registry, ctx, &tool_calls).await;
            let to_execute = partition::executable(&classified);

            history.extend(response.output.clone());

            let (results, fatal) = self.execute_batch(ctx, &to_execute).await;
            for result in &results {
                history.push(responses_output_item(result));
            }

            if let Some(error) = fatal {
                return Err(AgentError { error, partial: ResponsesAgentResult { history, stop_reason: StopReason::Stop, iterations } });
            }

            if partition::has_approval(&classified) {
                debug!(iterations, "agent loop stopping for approval");
                return Ok(ResponsesAgentResult { history, stop_reason: StopReason::Approval, iterations });
            }

            if iterations >= self.config.max_agent_depth {
                debug!(iterations, "agent loop reached max depth");
                return Ok(ResponsesAgentResult { history, stop_reason: StopReason::DepthReached, iterations });
            }
            iterations += 1;

            self.refresh_request_id(ctx).await;

            response = llm.generate(ctx, ResponsesRequest { input: history.clone() }).await.map_err(|error| AgentError {
                partial: ResponsesAgentResult { history: history.clone(), stop_reason: StopReason::Stop, iterations },
                error,
            })?;
        }
    }

    async fn refresh_request_id(&self, ctx: &AgentContext) {
        if let Some(fetch) = &self.config.fetch_new_request_id {
            if let Some(new_id) = fetch(ctx.clone()).await {
                ctx.set_request_id(new_id);
            }
        }
    }

    /// Run every call in `calls` concurrently, preserving the results in
    /// `calls`' original order regardless of completion order. A fatal
    /// error from one call does not cancel its siblings — every future is
    /// drained before the first fatal error (if any) is reported, so the
    /// set of completed results stays consistent.
    async fn execute_batch(&self, ctx: &AgentContext, calls: &[ToolCall]) -> (Vec<ToolResult>, Option<ToolfedError>) {
        if calls.is_empty() {
            return (Vec::new(), None);
        }

        let mut pending = FuturesUnordered::new();
        for (index, call) in calls.iter().cloned().enumerate() {
            let invoker = self.invoker.clone();
            let ctx = ctx.clone();
            pending.push(async move {
                let result = invoker.execute_tool_call(&ctx, &call).await;
                (index, result)
            });
        }

        let mut slots: Vec<Option<ToolResult>> = (0..calls.len()).map(|_| None).collect();
        let mut first_fatal = None;

        while let Some((index, result)) = pending.next().await {
            match result {
                Ok(tool_result) => slots[index] = Some(tool_result),
                Err(e) => {
                    warn!(index, error = %e, "fatal error executing tool call, draining remaining siblings");
                    if first_fatal.is_none() {
                        first_fatal = Some(e);
                    }
                }
            }
        }

        (slots.into_iter().flatten().collect(), first_fatal)
    }
}

fn chat_tool_message(result: &ToolResult) -> ChatMessage {
    ChatMessage { role: "tool".into(), content: Some(result.content.clone()), tool_calls: None, tool_call_id: Some(result.id.clone()) }
}

fn responses_output_item(result: &ToolResult) -> ResponsesItem {
    ResponsesItem::FunctionCallOutput { call_id: result.id.clone(), output: result.content.clone() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use toolfed_core::{ChatChoice, FinishReason, ClientConfig, ConnectionType, Result as CoreResult, ToolAllowlist};
    use toolfed_plugin::PluginChain;
    use toolfed_registry::DefaultTransportFactory;
    use toolfed_transport::InProcessTransport;

    async fn driver_with_echo_and_calculator(auto: ToolAllowlist) -> AgentDriver {
        let in_process = InProcessTransport::new();
        in_process.register("echo", "echoes", json!({}), |args, _ctx| async move { Ok(args) });
        in_process.register("calculator", "adds", json!({}), |args, _ctx| async move { Ok(args) });
        let factory = Arc::new(DefaultTransportFactory::new(in_process));
        let registry = Arc::new(ClientRegistry::new(factory));
        registry
            .add_client(ClientConfig {
                id: "1".into(),
                name: "toolfedInternal".into(),
                connection_type: ConnectionType::InProcess,
                connection_string: None,
                stdio_config: None,
                headers: HashMap::new(),
                tools_to_execute: ToolAllowlist::allow_all(),
                tools_to_auto_execute: auto,
                is_code_mode_client: true,
            })
            .await
            .unwrap();
        let invoker = Arc::new(ToolInvoker::new(registry.clone(), Arc::new(PluginChain::new()), Duration::from_secs(5)));
        AgentDriver::new(registry, invoker, ManagerConfig::default())
    }

    fn text_response() -> ChatResponse {
        ChatResponse { choices: vec![ChatChoice { finish_reason: FinishReason::Stop, message: ChatMessage::assistant_text("done") }] }
    }

    fn tool_call_response(calls: Vec<ToolCall>) -> ChatResponse {
        ChatResponse { choices: vec![ChatChoice { finish_reason: FinishReason::ToolCalls, message: ChatMessage::assistant_tool_calls(calls) }] }
    }

    struct ScriptedLlm {
        responses: Mutex<Vec<ChatResponse>>,
        calls: AtomicU32,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<ChatResponse>) -> Self {
            Self { responses: Mutex::new(responses), calls: AtomicU32::new(0) }
        }
    }

    #[async_trait]
    impl ChatLlm for ScriptedLlm {
        async fn generate(&self, _ctx: &AgentContext, _req: ChatRequest) -> CoreResult<ChatResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.responses.lock().unwrap().remove(0))
        }
    }

    #[tokio::test]
    async fn scenario_propagation_two_id_generations_three_turns() {
        let driver = driver_with_echo_and_calculator(ToolAllowlist::allow_all()).await;
        let ids = Mutex::new(vec!["req-1-iter-2".to_string(), "req-1-iter-1".to_string()]);
        let config = ManagerConfig::default().with_fetch_new_request_id(Arc::new(move |_ctx| {
            let next = ids.lock().unwrap().pop();
            Box::pin(async move { next })
        }));
        let driver = AgentDriver::new(driver_registry(&driver), driver_invoker(&driver), config);

        let ctx = AgentContext::new("req-1");
        let initial = tool_call_response(vec![ToolCall::new("1", "toolfedInternal-echo", json!("first"))]);
        let llm = ScriptedLlm::new(vec![tool_call_response(vec![ToolCall::new("2", "toolfedInternal-echo", json!("second"))]), text_response()]);

        let result = driver.run_chat(&ctx, Vec::new(), initial, &llm).await.unwrap();

        assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.stop_reason, StopReason::Stop);
        assert_eq!(ctx.original_request_id().as_deref(), Some("req-1"));
        assert_eq!(ctx.request_id(), "req-1-iter-2");
    }

    #[tokio::test]
    async fn scenario_approval_stop_no_further_llm_call() {
        let driver = driver_with_echo_and_calculator(ToolAllowlist(vec!["echo".to_string()])).await;
        let ctx = AgentContext::new("r");
        let initial = tool_call_response(vec![
            ToolCall::new("1", "toolfedInternal-echo", json!({})),
            ToolCall::new("2", "toolfedInternal-calculator", json!({})),
        ]);
        let llm = ScriptedLlm::new(vec![]);

        let result = driver.run_chat(&ctx, Vec::new(), initial, &llm).await.unwrap();

        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.stop_reason, StopReason::Approval);
        assert!(result.history.iter().any(|m| m.tool_call_id.as_deref() == Some("1")));
        assert!(!result.history.iter().any(|m| m.tool_call_id.as_deref() == Some("2")));
    }

    #[tokio::test]
    async fn scenario_depth_cap_exactly_max_depth_internal_calls() {
        let mut config = ManagerConfig::default();
        config.max_agent_depth = 3;
        let driver = driver_with_echo_and_calculator(ToolAllowlist::allow_all()).await;
        let driver = AgentDriver::new(driver_registry(&driver), driver_invoker(&driver), config);

        let ctx = AgentContext::new("r");
        let call = || tool_call_response(vec![ToolCall::new("1", "toolfedInternal-echo", json!({}))]);
        let llm = ScriptedLlm::new(vec![call(), call(), call()]);

        let result = driver.run_chat(&ctx, Vec::new(), call(), &llm).await.unwrap();

        assert_eq!(llm.calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.stop_reason, StopReason::DepthReached);
        assert_eq!(result.iterations, 3);
    }

    #[tokio::test]
    async fn empty_fetch_new_request_id_leaves_request_id_unchanged() {
        let config = ManagerConfig::default().with_fetch_new_request_id(Arc::new(|_ctx| Box::pin(async { Some(String::new()) })));
        let driver = driver_with_echo_and_calculator(ToolAllowlist::allow_all()).await;
        let driver = AgentDriver::new(driver_registry(&driver), driver_invoker(&driver), config);

        let ctx = AgentContext::new("req-X");
        let initial = tool_call_response(vec![ToolCall::new("1", "toolfedInternal-echo", json!({}))]);
        let llm = ScriptedLlm::new(vec![text_response()]);

        driver.run_chat(&ctx, Vec::new(), initial, &llm).await.unwrap();

        assert_eq!(ctx.request_id(), "req-X");
    }

    #[tokio::test]
    async fn cancelled_context_returns_partial_result_with_error() {
        let driver = driver_with_echo_and_calculator(ToolAllowlist::allow_all()).await;
        let ctx = AgentContext::new("r");
        ctx.cancel();
        let initial = text_response();
        let llm = ScriptedLlm::new(vec![]);

        let err = driver.run_chat(&ctx, vec![ChatMessage::assistant_text("prior")], initial, &llm).await.unwrap_err();

        assert!(matches!(err.error, ToolfedError::Cancelled));
        assert_eq!(err.partial.history.len(), 1);
    }

    // Test-only accessors so scenario tests can rebuild a driver around a
    // different `ManagerConfig` without duplicating client setup.
    fn driver_registry(driver: &AgentDriver) -> Arc<ClientRegistry> {
        driver.registry.clone()
    }

    fn driver_invoker(driver: &AgentDriver) -> Arc<ToolInvoker> {
        driver.invoker.clone()
    }
}
