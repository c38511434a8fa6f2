//! stdio transport: a child process speaking newline-delimited JSON-RPC on
//! its stdin/stdout. Detects premature exit and reports
//! connection loss via `is_alive()`, the out-of-band signal the client
//! registry polls/observes to transition a client to `Disconnected`.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};
use toolfed_core::{AgentContext, Result, ToolfedError, Tool, Transport, TransportToolResult};
use tracing::{debug, warn};

use crate::rpc::{next_id, CallToolResult, JsonRpcResponse, ListToolsResult};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

pub struct StdioTransport {
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    pending: PendingMap,
    alive: Arc<AtomicBool>,
}

impl StdioTransport {
    pub fn new(command: impl Into<String>, args: Vec<String>, env: HashMap<String, String>) -> Self {
        Self {
            command: command.into(),
            args,
            env,
            child: Mutex::new(None),
            stdin: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            alive: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the child process is still believed to be running. Flips to
    /// false the moment the reader task observes EOF or a spawn/IO error.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn spawn(&self) -> Result<()> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| ToolfedError::Transport(format!("spawn failed: {e}")))?;
        let stdout = child.stdout.take().ok_or_else(|| ToolfedError::Transport("no stdout pipe".into()))?;
        let stdin = child.stdin.take().ok_or_else(|| ToolfedError::Transport("no stdin pipe".into()))?;

        self.alive.store(true, Ordering::SeqCst);

        let pending = self.pending.clone();
        let alive = self.alive.clone();
        let command_name = self.command.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<IdEnvelope>(&line) {
                            Ok(env) => {
                                let mut guard = pending.lock().await;
                                if let Some(tx) = guard.remove(&env.id) {
                                    let _ = tx.send(JsonRpcResponse { result: env.result, error: env.error });
                                }
                            }
                            Err(e) => {
                                warn!(command = %command_name, error = %e, line, "malformed stdio json-rpc line");
                            }
                        }
                    }
                    Ok(None) => {
                        debug!(command = %command_name, "stdio transport child closed stdout (EOF)");
                        break;
                    }
                    Err(e) => {
                        warn!(command = %command_name, error = %e, "stdio transport read error");
                        break;
                    }
                }
            }
            alive.store(false, Ordering::SeqCst);
            let mut guard = pending.lock().await;
            guard.clear();
        });

        *self.child.lock().await = Some(child);
        *self.stdin.lock().await = Some(stdin);
        Ok(())
    }

    async fn call(&self, method: &str, params: Value, ctx: &AgentContext) -> Result<Value> {
        if !self.is_alive() {
            return Err(ToolfedError::Transport(format!("'{}' process is not running", self.command)));
        }

        let id = next_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let request = serde_json::json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        let line = format!("{}\n", serde_json::to_string(&request)?);

        {
            let mut guard = self.stdin.lock().await;
            let stdin = guard.as_mut().ok_or_else(|| ToolfedError::Transport("stdin not connected".into()))?;
            stdin.write_all(line.as_bytes()).await.map_err(|e| ToolfedError::Transport(e.to_string()))?;
        }

        let response = tokio::select! {
            result = rx => result.map_err(|_| ToolfedError::Transport("stdio process closed before responding".into()))?,
            _ = ctx.cancellation_token().cancelled() => {
                self.pending.lock().await.remove(&id);
                return Err(ToolfedError::Cancelled);
            }
            _ = wait_for_deadline(ctx) => {
                self.pending.lock().await.remove(&id);
                return Err(ToolfedError::Cancelled);
            }
        };

        if let Some(err) = response.error {
            return Err(ToolfedError::Transport(err.message));
        }
        response.result.ok_or_else(|| ToolfedError::Transport("empty JSON-RPC result".into()))
    }
}

async fn wait_for_deadline(ctx: &AgentContext) {
    match ctx.deadline() {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

#[derive(serde::Deserialize)]
struct IdEnvelope {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<crate::rpc::JsonRpcError>,
}

#[async_trait]
impl Transport for StdioTransport {
    async fn connect(&self) -> Result<Vec<Tool>> {
        self.spawn().await?;
        let dummy_ctx = AgentContext::new("connect").with_timeout(std::time::Duration::from_secs(10));
        let result = self.call("tools/list", serde_json::json!({}), &dummy_ctx).await?;
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
        let params = serde_json::json!({ "name": local_name, "arguments": args });
        let result = self.call("tools/call", params, ctx).await?;
        let parsed: CallToolResult = serde_json::from_value(result)?;
        Ok(if parsed.is_error {
            TransportToolResult::error(parsed.joined_text())
        } else {
            TransportToolResult::ok(parsed.joined_text())
        })
    }

    async fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            let _ = child.kill().await;
            let _ = child.wait().await;
        }
    }
}
