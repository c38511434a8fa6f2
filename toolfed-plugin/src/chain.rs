//! `PluginChain`: the ordered pre/post hook sequence wrapped around every
//! tool invocation.

use std::future::Future;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use toolfed_core::{AgentContext, Result, TransportToolResult};

use crate::hooks::{HookRequest, Plugin};

/// Registered plugins, read by every invocation and written only when a
/// plugin is added or removed. A hot invocation clones the `Arc<Vec<_>>`
/// snapshot once up front rather than holding the lock across any
/// `.await`.
#[derive(Default)]
pub struct PluginChain {
    plugins: RwLock<Arc<Vec<Arc<dyn Plugin>>>>,
}

impl PluginChain {
    pub fn new() -> Self {
        Self { plugins: RwLock::new(Arc::new(Vec::new())) }
    }

    /// Append a plugin to the end of the chain (runs last among pre-hooks,
    /// first among post-hooks).
    pub fn register(&self, plugin: Arc<dyn Plugin>) {
        let mut guard = self.plugins.write().unwrap();
        let mut next = (**guard).clone();
        next.push(plugin);
        *guard = Arc::new(next);
    }

    pub fn len(&self) -> usize {
        self.plugins.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Arc<Vec<Arc<dyn Plugin>>> {
        self.plugins.read().unwrap().clone()
    }

    /// Run the chain around `dispatch`:
    ///
    /// 1. Pre-hooks run in registration order. A pre-hook error aborts the
    ///    chain immediately (no post-hooks run). A short-circuit records its
    ///    index and skips `dispatch`.
    /// 2. Absent a short-circuit, `dispatch` runs with the (possibly
    ///    rewritten) request.
    /// 3. Post-hooks run in reverse order: the full chain if no
    ///    short-circuit fired, otherwise only the hooks *below* the
    ///    short-circuiting one, preserving the "still observe the synthetic
    ///    response" symmetry.
    pub async fn run<F, Fut>(&self, ctx: &AgentContext, initial: HookRequest, dispatch: F) -> Result<TransportToolResult>
    where
        F: FnOnce(HookRequest) -> Fut,
        Fut: Future<Output = Result<TransportToolResult>>,
    {
        let plugins = self.snapshot();
        let mut request = initial;
        let mut short_circuit_index: Option<usize> = None;
        let mut synthetic: Option<TransportToolResult> = None;

        for (i, plugin) in plugins.iter().enumerate() {
            match plugin.pre(ctx, request).await {
                Ok(outcome) => {
                    request = outcome.request;
                    if let Some(result) = outcome.short_circuit {
                        debug!(plugin = plugin.name(), index = i, "plugin short-circuited tool invocation");
                        synthetic = Some(result);
                        short_circuit_index = Some(i);
                        break;
                    }
                }
                Err(e) => {
                    warn!(plugin = plugin.name(), index = i, error = %e, "plugin pre-hook aborted invocation");
                    return Err(e);
                }
            }
        }

        let mut outcome = match synthetic {
            Some(result) => Ok(result),
            None => dispatch(request.clone()).await,
        };

        let post_order: Box<dyn Iterator<Item = usize>> = match short_circuit_index {
            Some(i) => Box::new((0..i).rev()),
            None => Box::new((0..plugins.len()).rev()),
        };

        for i in post_order {
            outcome = plugins[i].post(ctx, &request, outcome).await;
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use toolfed_core::ToolfedError;

    struct RecordingPlugin {
        name: &'static str,
        log: Arc<std::sync::Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Plugin for RecordingPlugin {
        fn name(&self) -> &str {
            self.name
        }

        async fn pre(&self, _ctx: &AgentContext, req: HookRequest) -> Result<crate::hooks::PreHookOutcome> {
            self.log.lock().unwrap().push(format!("{}:pre", self.name));
            Ok(crate::hooks::PreHookOutcome::continue_with(req))
        }

        async fn post(&self, _ctx: &AgentContext, _req: &HookRequest, outcome: Result<TransportToolResult>) -> Result<TransportToolResult> {
            self.log.lock().unwrap().push(format!("{}:post", self.name));
            outcome
        }
    }

    struct ShortCircuitPlugin {
        log: Arc<std::sync::Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Plugin for ShortCircuitPlugin {
        fn name(&self) -> &str {
            "shortcircuit"
        }

        async fn pre(&self, _ctx: &AgentContext, req: HookRequest) -> Result<crate::hooks::PreHookOutcome> {
            self.log.lock().unwrap().push("shortcircuit:pre".to_string());
            Ok(crate::hooks::PreHookOutcome::short_circuit(req, TransportToolResult::ok("synthetic")))
        }
    }

    struct ErrorPlugin;

    #[async_trait]
    impl Plugin for ErrorPlugin {
        async fn pre(&self, _ctx: &AgentContext, _req: HookRequest) -> Result<crate::hooks::PreHookOutcome> {
            Err(ToolfedError::Plugin("boom".into()))
        }
    }

    fn ctx() -> AgentContext {
        AgentContext::new("r")
    }

    #[tokio::test]
    async fn empty_chain_is_plugin_identity() {
        let chain = PluginChain::new();
        let dispatched = AtomicUsize::new(0);
        let result = chain
            .run(&ctx(), HookRequest::new("srv", "echo", json!({})), |_req| {
                dispatched.fetch_add(1, Ordering::SeqCst);
                async move { Ok(TransportToolResult::ok("direct")) }
            })
            .await
            .unwrap();
        assert_eq!(dispatched.load(Ordering::SeqCst), 1);
        assert_eq!(result.content, "direct");
    }

    #[tokio::test]
    async fn pre_and_post_run_in_mirrored_order() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let chain = PluginChain::new();
        chain.register(Arc::new(RecordingPlugin { name: "a", log: log.clone() }));
        chain.register(Arc::new(RecordingPlugin { name: "b", log: log.clone() }));

        chain.run(&ctx(), HookRequest::new("srv", "echo", json!({})), |_req| async move { Ok(TransportToolResult::ok("x")) }).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["a:pre", "b:pre", "b:post", "a:post"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_dispatch_but_runs_lower_post_hooks() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let chain = PluginChain::new();
        chain.register(Arc::new(RecordingPlugin { name: "a", log: log.clone() }));
        chain.register(Arc::new(ShortCircuitPlugin { log: log.clone() }));
        chain.register(Arc::new(RecordingPlugin { name: "c", log: log.clone() }));

        let dispatched = AtomicUsize::new(0);
        let result = chain
            .run(&ctx(), HookRequest::new("srv", "echo", json!({})), |_req| {
                dispatched.fetch_add(1, Ordering::SeqCst);
                async move { Ok(TransportToolResult::ok("never")) }
            })
            .await
            .unwrap();

        assert_eq!(dispatched.load(Ordering::SeqCst), 0);
        assert_eq!(result.content, "synthetic");
        // "c" short-circuited before its own pre recorded below; "a" (lower index) still sees post.
        assert_eq!(*log.lock().unwrap(), vec!["a:pre", "shortcircuit:pre", "a:post"]);
    }

    #[tokio::test]
    async fn pre_hook_error_aborts_without_running_post_hooks() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let chain = PluginChain::new();
        chain.register(Arc::new(RecordingPlugin { name: "a", log: log.clone() }));
        chain.register(Arc::new(ErrorPlugin));
        chain.register(Arc::new(RecordingPlugin { name: "c", log: log.clone() }));

        let result = chain.run(&ctx(), HookRequest::new("srv", "echo", json!({})), |_req| async move { Ok(TransportToolResult::ok("never")) }).await;

        assert!(matches!(result, Err(ToolfedError::Plugin(_))));
        assert_eq!(*log.lock().unwrap(), vec!["a:pre"]);
    }

    #[tokio::test]
    async fn post_hook_error_replaces_prior_error() {
        struct ReplacingPlugin;
        #[async_trait]
        impl Plugin for ReplacingPlugin {
            async fn post(&self, _ctx: &AgentContext, _req: &HookRequest, _outcome: Result<TransportToolResult>) -> Result<TransportToolResult> {
                Err(ToolfedError::Plugin("post replaced it".into()))
            }
        }

        let chain = PluginChain::new();
        chain.register(Arc::new(ReplacingPlugin));

        let result = chain
            .run(&ctx(), HookRequest::new("srv", "echo", json!({})), |_req| async move { Err(ToolfedError::Transport("original".into())) })
            .await;

        assert!(matches!(result, Err(ToolfedError::Plugin(msg)) if msg == "post replaced it"));
    }
}
