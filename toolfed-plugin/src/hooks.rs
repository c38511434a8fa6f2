//! The `Plugin` trait: one pre-hook and one post-hook around a tool
//! invocation.

use async_trait::async_trait;
use serde_json::Value;
use toolfed_core::{AgentContext, Result, TransportToolResult};

/// The request a pre-hook observes and may rewrite before it reaches the
/// transport. Carries the already-resolved client/local name (not the
/// qualified name) since resolution happens upstream in the invoker.
#[derive(Debug, Clone)]
pub struct HookRequest {
    pub client_name: String,
    pub local_name: String,
    pub arguments: Value,
}

impl HookRequest {
    pub fn new(client_name: impl Into<String>, local_name: impl Into<String>, arguments: Value) -> Self {
        Self { client_name: client_name.into(), local_name: local_name.into(), arguments }
    }
}

/// What a pre-hook decided: either continue the chain with (possibly
/// rewritten) `request`, or short-circuit with a synthetic result — the
/// transport is never invoked in the latter case.
pub struct PreHookOutcome {
    pub request: HookRequest,
    pub short_circuit: Option<TransportToolResult>,
}

impl PreHookOutcome {
    pub fn continue_with(request: HookRequest) -> Self {
        Self { request, short_circuit: None }
    }

    pub fn short_circuit(request: HookRequest, result: TransportToolResult) -> Self {
        Self { request, short_circuit: Some(result) }
    }
}

/// One link in the [`crate::PluginChain`]. Both hooks default to a
/// passthrough so a plugin that only cares about one side of the call need
/// implement a single method.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// A short, stable name used only for log correlation.
    fn name(&self) -> &str {
        "plugin"
    }

    /// Observe or rewrite the request before dispatch. Returning `Err`
    /// aborts the whole chain: no transport call, and lower-indexed
    /// post-hooks do not run either — distinct from a short-circuit, which
    /// still lets lower-indexed post-hooks run.
    async fn pre(&self, _ctx: &AgentContext, req: HookRequest) -> Result<PreHookOutcome> {
        Ok(PreHookOutcome::continue_with(req))
    }

    /// Observe or rewrite the outcome (success, reported error, or
    /// invocation error) after dispatch or short-circuit.
    async fn post(&self, _ctx: &AgentContext, _req: &HookRequest, outcome: Result<TransportToolResult>) -> Result<TransportToolResult> {
        outcome
    }
}
