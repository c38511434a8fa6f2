//! Classifies one turn's tool calls into `auto` / `approval` / `unknown`.

use toolfed_core::{normalize_client_name, AgentContext, ToolCall};
use toolfed_registry::ClientRegistry;

/// Where one tool call landed after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Owning client auto-executes this tool; runs without stopping for approval.
    Auto,
    /// Resolves and passes the execute-allowlist, but is not auto-eligible —
    /// this is what triggers an approval stop.
    Approval,
    /// Unresolvable (no such client/tool) or excluded by the execute-allowlist.
    /// Executed alongside `Auto` anyway: `ToolInvoker` folds both failure
    /// modes into an `is_error` result, so there is nothing to gain by
    /// holding these back the way a genuine approval-pending call is held.
    Unknown,
}

#[derive(Debug, Clone)]
pub struct ClassifiedCall {
    pub call: ToolCall,
    pub kind: CallKind,
}

/// Classify every call in `calls` against the current registry/context.
pub async fn classify(registry: &ClientRegistry, ctx: &AgentContext, calls: &[ToolCall]) -> Vec<ClassifiedCall> {
    let mut out = Vec::with_capacity(calls.len());
    for call in calls {
        let kind = match call.split_name() {
            Some((client, local)) => {
                let client = normalize_client_name(client);
                if registry.is_auto_executable(ctx, client, local).await {
                    CallKind::Auto
                } else {
                    let qualified = toolfed_core::qualify(client, local);
                    match registry.resolve_tool(ctx, &qualified).await {
                        Ok(_) => CallKind::Approval,
                        Err(_) => CallKind::Unknown,
                    }
                }
            }
            None => CallKind::Unknown,
        };
        out.push(ClassifiedCall { call: call.clone(), kind });
    }
    out
}

/// Calls this iteration will actually execute: everything except
/// `Approval`, in original order.
pub fn executable(classified: &[ClassifiedCall]) -> Vec<ToolCall> {
    classified.iter().filter(|c| c.kind != CallKind::Approval).map(|c| c.call.clone()).collect()
}

pub fn has_approval(classified: &[ClassifiedCall]) -> bool {
    classified.iter().any(|c| c.kind == CallKind::Approval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use toolfed_core::{ClientConfig, ConnectionType, ToolAllowlist};
    use toolfed_registry::DefaultTransportFactory;
    use toolfed_transport::InProcessTransport;

    async fn registry_with(tools_to_execute: ToolAllowlist, tools_to_auto_execute: ToolAllowlist) -> ClientRegistry {
        let in_process = InProcessTransport::new();
        in_process.register("echo", "echoes", json!({}), |args, _ctx| async move { Ok(args) });
        in_process.register("calculator", "adds numbers", json!({}), |args, _ctx| async move { Ok(args) });
        let factory = Arc::new(DefaultTransportFactory::new(in_process));
        let registry = ClientRegistry::new(factory);
        registry
            .add_client(ClientConfig {
                id: "1".into(),
                name: "toolfedInternal".into(),
                connection_type: ConnectionType::InProcess,
                connection_string: None,
                stdio_config: None,
                headers: HashMap::new(),
                tools_to_execute,
                tools_to_auto_execute,
                is_code_mode_client: true,
            })
            .await
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn echo_auto_calculator_approval() {
        let registry = registry_with(ToolAllowlist::allow_all(), ToolAllowlist(vec!["echo".to_string()])).await;
        let ctx = AgentContext::new("r");
        let calls = vec![
            ToolCall::new("1", "toolfedInternal-echo", json!({})),
            ToolCall::new("2", "toolfedInternal-calculator", json!({})),
        ];

        let classified = classify(&registry, &ctx, &calls).await;
        assert_eq!(classified[0].kind, CallKind::Auto);
        assert_eq!(classified[1].kind, CallKind::Approval);
        assert!(has_approval(&classified));
        assert_eq!(executable(&classified).len(), 1);
    }

    #[tokio::test]
    async fn missing_tool_is_unknown() {
        let registry = registry_with(ToolAllowlist::allow_all(), ToolAllowlist::allow_all()).await;
        let ctx = AgentContext::new("r");
        let calls = vec![ToolCall::new("1", "toolfedInternal-nonexistent", json!({}))];

        let classified = classify(&registry, &ctx, &calls).await;
        assert_eq!(classified[0].kind, CallKind::Unknown);
        assert!(!has_approval(&classified));
        assert_eq!(executable(&classified).len(), 1);
    }

    #[tokio::test]
    async fn executable_preserves_original_order() {
        let registry = registry_with(ToolAllowlist::allow_all(), ToolAllowlist(vec!["echo".to_string()])).await;
        let ctx = AgentContext::new("r");
        let calls = vec![
            ToolCall::new("1", "toolfedInternal-echo", json!({})),
            ToolCall::new("2", "toolfedInternal-nonexistent", json!({})),
            ToolCall::new("3", "toolfedInternal-calculator", json!({})),
        ];

        let classified = classify(&registry, &ctx, &calls).await;
        let exec = executable(&classified);
        assert_eq!(exec.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["1", "2"]);
    }
}
