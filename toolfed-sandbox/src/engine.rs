//! The boa-backed guest interpreter: global bindings, console capture, and
//! the timeout/loop-limit guardrails around one `eval`.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use boa_engine::object::ObjectInitializer;
use boa_engine::property::Attribute;
use boa_engine::{js_string, Context, JsError, JsResult, JsValue, NativeFunction, Source};
use tracing::{debug, warn};

use toolfed_core::{Result as CoreResult, ToolResult};

use crate::outcome::ExecutionReport;

/// One tool a client exposes to the sandbox: local name and
/// description only — the JSON schema is not enforced inside the
/// interpreter itself, any more than it is enforced by the wire transport.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub local_name: String,
    pub description: String,
}

/// One connected client's tools, as visible to the guest program under
/// `tools_to_execute` — never `tools_to_auto_execute`, which is an
/// agent-level policy that does not apply inside code mode.
#[derive(Debug, Clone)]
pub struct ClientBinding {
    pub client_name: String,
    pub tools: Vec<ToolSpec>,
}

/// The host-side bridge a guest `<client>.<tool>(args)` call is routed
/// through. `toolfed-agent` implements this over `ToolInvoker` so the call
/// honors the same plugin chain, allowlist, and deadline as any other tool
/// invocation; this crate never talks to a registry or transport directly.
#[async_trait]
pub trait ToolBridge: Send + Sync {
    async fn call_tool(&self, client_name: &str, local_name: &str, arguments: serde_json::Value) -> CoreResult<ToolResult>;
}

thread_local! {
    static CALL_CTX: RefCell<Option<CallContext>> = const { RefCell::new(None) };
}

struct CallContext {
    bindings: Vec<(String, String)>,
    bridge: Arc<dyn ToolBridge>,
    handle: tokio::runtime::Handle,
    console: Rc<RefCell<Vec<String>>>,
}

/// Runs one code-mode program per `execute` call. A fresh `boa_engine`
/// `Context` (and a freshly populated thread-local call context) backs
/// every invocation; nothing persists from one execution to the next.
pub struct SandboxExecutor {
    loop_iteration_limit: u64,
    recursion_limit: usize,
}

impl Default for SandboxExecutor {
    fn default() -> Self {
        // Belt-and-suspenders guest-side bound on top of the wall-clock
        // timeout: boa has no preemption, so an abandoned `while(true){}`
        // thread is only stopped by one of these two bounds.
        Self { loop_iteration_limit: 50_000_000, recursion_limit: 512 }
    }
}

impl SandboxExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loop_iteration_limit(mut self, limit: u64) -> Self {
        self.loop_iteration_limit = limit;
        self
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Run `code` with `bindings` exposed as globals, routing every bound
    /// tool call through `bridge`. Bounded by `timeout`: on expiry the
    /// guest thread is abandoned (its result is simply never awaited) and
    /// an error report is returned immediately.
    pub async fn execute(&self, code: &str, bindings: Vec<ClientBinding>, bridge: Arc<dyn ToolBridge>, timeout: Duration) -> ExecutionReport {
        let environment = environment_summary(&bindings);
        let handle = tokio::runtime::Handle::current();
        let loop_limit = self.loop_iteration_limit;
        let recursion_limit = self.recursion_limit;
        let code = code.to_string();

        let task = tokio::task::spawn_blocking(move || run_in_context(&code, bindings, bridge, handle, loop_limit, recursion_limit));

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(report)) => report,
            Ok(Err(join_err)) => {
                warn!(error = %join_err, "code-mode guest thread panicked");
                ExecutionReport::runtime_error(&[], &format!("guest thread panicked: {join_err}"), &environment)
            }
            Err(_) => {
                debug!(?timeout, "code-mode execution timed out");
                ExecutionReport::runtime_error(&[], &format!("timed out after {timeout:?}"), &environment)
            }
        }
    }
}

fn environment_summary(bindings: &[ClientBinding]) -> String {
    format!("clients=[{}]", bindings.iter().map(|b| b.client_name.as_str()).collect::<Vec<_>>().join(", "))
}

fn run_in_context(
    code: &str,
    bindings: Vec<ClientBinding>,
    bridge: Arc<dyn ToolBridge>,
    handle: tokio::runtime::Handle,
    loop_limit: u64,
    recursion_limit: usize,
) -> ExecutionReport {
    let environment = environment_summary(&bindings);
    let console = Rc::new(RefCell::new(Vec::new()));

    let mut flat_bindings = Vec::new();
    for binding in &bindings {
        for tool in &binding.tools {
            flat_bindings.push((binding.client_name.clone(), tool.local_name.clone()));
        }
    }

    CALL_CTX.with(|slot| {
        *slot.borrow_mut() = Some(CallContext { bindings: flat_bindings.clone(), bridge, handle, console: console.clone() });
    });

    let mut context = Context::default();
    context.runtime_limits_mut().set_loop_iteration_limit(loop_limit);
    context.runtime_limits_mut().set_recursion_limit(recursion_limit);

    let report = match install_globals(&mut context, &bindings) {
        Ok(()) => {
            let wrapped = format!("(function() {{\n{}\n}})()", strip_await(code));
            match context.eval(Source::from_bytes(wrapped.as_bytes())) {
                Ok(value) => match value.to_json(&mut context) {
                    Ok(json) => ExecutionReport::success(&console.borrow(), &json.to_string(), &environment),
                    Err(e) => ExecutionReport::runtime_error(&console.borrow(), &format!("could not serialize return value: {e}"), &environment),
                },
                Err(e) => {
                    let message = e.to_string();
                    if message.contains("SyntaxError") {
                        ExecutionReport::validation_error(&console.borrow(), &message, &environment)
                    } else {
                        ExecutionReport::runtime_error(&console.borrow(), &message, &environment)
                    }
                }
            }
        }
        Err(e) => ExecutionReport::failed(&format!("failed to install sandbox globals: {e}"), &environment),
    };

    CALL_CTX.with(|slot| *slot.borrow_mut() = None);
    report
}

/// This interpreter never drives real JS `async`/`await`: every bound tool
/// call is dispatched synchronously (the guest thread blocks on the
/// bridged future via `tokio::runtime::Handle::block_on`, see
/// `call_bound_tool`), so `await` is accepted purely as caller-facing
/// syntax sugar and stripped before evaluation rather than routed through
/// a promise job queue.
fn strip_await(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut rest = code;
    while let Some(pos) = rest.find("await") {
        let before_ok = pos == 0 || !rest.as_bytes()[pos - 1].is_ascii_alphanumeric();
        let after = pos + "await".len();
        let after_ok = rest.as_bytes().get(after).map(|b| !b.is_ascii_alphanumeric() && *b != b'_').unwrap_or(true);
        if before_ok && after_ok {
            out.push_str(&rest[..pos]);
        } else {
            out.push_str(&rest[..after]);
        }
        rest = &rest[after..];
    }
    out.push_str(rest);
    out
}

fn install_globals(context: &mut Context, bindings: &[ClientBinding]) -> JsResult<()> {
    let console = ObjectInitializer::new(context)
        .function(NativeFunction::from_copy_closure_with_captures(console_log, ()), js_string!("log"), 0)
        .build();
    context.register_global_property(js_string!("console"), console, Attribute::all())?;

    let mut idx = 0usize;
    for binding in bindings {
        let mut obj_init = ObjectInitializer::new(context);
        for tool in &binding.tools {
            obj_init.function(NativeFunction::from_copy_closure_with_captures(call_bound_tool, idx), js_string!(tool.local_name.as_str()), 1);
            idx += 1;
        }
        let obj = obj_init.build();
        context.register_global_property(js_string!(binding.client_name.as_str()), obj, Attribute::all())?;
    }
    Ok(())
}

fn console_log(_this: &JsValue, args: &[JsValue], _captures: &(), context: &mut Context) -> JsResult<JsValue> {
    let rendered = args
        .iter()
        .map(|v| v.to_json(context).map(|j| j.to_string()).unwrap_or_else(|_| format!("{v:?}")))
        .collect::<Vec<_>>()
        .join(" ");
    CALL_CTX.with(|slot| {
        if let Some(ctx) = slot.borrow().as_ref() {
            ctx.console.borrow_mut().push(rendered);
        }
    });
    Ok(JsValue::undefined())
}

fn call_bound_tool(_this: &JsValue, args: &[JsValue], captures: &usize, context: &mut Context) -> JsResult<JsValue> {
    let idx = *captures;
    let arg_json = match args.first() {
        Some(v) => v.to_json(context)?,
        None => serde_json::Value::Null,
    };

    let (client_name, local_name, bridge, handle) = CALL_CTX.with(|slot| {
        let borrow = slot.borrow();
        let ctx = borrow.as_ref().expect("sandbox call context must be set while the guest program runs");
        let (client_name, local_name) = ctx.bindings[idx].clone();
        (client_name, local_name, ctx.bridge.clone(), ctx.handle.clone())
    });

    let outcome = handle.block_on(bridge.call_tool(&client_name, &local_name, arg_json));

    match outcome {
        Ok(result) if result.is_error => Err(JsError::from_opaque(JsValue::from(js_string!(result.content.as_str())))),
        Ok(result) => {
            let parsed: serde_json::Value = serde_json::from_str(&result.content).unwrap_or(serde_json::Value::String(result.content));
            JsValue::from_json(&parsed, context)
        }
        Err(e) => Err(JsError::from_opaque(JsValue::from(js_string!(e.to_string().as_str())))),
    }
}
