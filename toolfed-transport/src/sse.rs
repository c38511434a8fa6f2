//! SSE transport: a persistent event stream for server-pushed notifications,
//! layered over the same request/response RPC envelope as HTTP.
//! Reconnection is bounded and backoff-free — callers drive it
//! explicitly via `ReconnectClient`, never automatically in the background.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use toolfed_core::{AgentContext, Result, ToolfedError, Tool, Transport, TransportToolResult};
use tracing::{debug, warn};

use crate::http::HttpTransport;

/// Wraps an [`HttpTransport`] for request/response traffic and maintains a
/// background task consuming the server's event stream for notifications.
pub struct SseTransport {
    rpc: HttpTransport,
    events_url: String,
    headers: HashMap<String, String>,
    stream_task: Mutex<Option<JoinHandle<()>>>,
}

impl SseTransport {
    pub fn new(endpoint: impl Into<String>, headers: HashMap<String, String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            rpc: HttpTransport::new(endpoint.clone(), headers.clone()),
            events_url: endpoint,
            headers,
            stream_task: Mutex::new(None),
        }
    }

    /// (Re)start the background SSE listener. Bounded and backoff-free: one
    /// connection attempt, no internal retry loop.
    async fn start_event_stream(&self) -> Result<()> {
        let client = reqwest::Client::new();
        let mut builder = client.get(&self.events_url).header("Accept", "text/event-stream");
        for (k, v) in &self.headers {
            builder = builder.header(k, v);
        }

        let resp = builder.send().await.map_err(|e| ToolfedError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ToolfedError::Transport(format!("sse connect status {}", resp.status())));
        }

        let stream = resp.bytes_stream();
        let mut event_stream = eventsource_stream::Eventsource::new(stream);

        let url = self.events_url.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = event_stream.next().await {
                match event {
                    Ok(ev) => debug!(url = %url, event = %ev.event, "sse notification received"),
                    Err(e) => {
                        warn!(url = %url, error = %e, "sse stream closed with error");
                        break;
                    }
                }
            }
        });

        let mut guard = self.stream_task.lock().await;
        if let Some(old) = guard.take() {
            old.abort();
        }
        *guard = Some(handle);
        Ok(())
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn connect(&self) -> Result<Vec<Tool>> {
        // Best-effort: failure to establish the notification stream does not
        // fail the handshake, since tool discovery happens over the
        // request/response channel.
        if let Err(e) = self.start_event_stream().await {
            warn!(error = %e, "sse notification stream unavailable, continuing with request/response only");
        }
        self.rpc.connect().await
    }

    async fn invoke(&self, local_name: &str, args: Value, ctx: &AgentContext) -> Result<TransportToolResult> {
        self.rpc.invoke(local_name, args, ctx).await
    }

    async fn close(&self) {
        let mut guard = self.stream_task.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
        }
        self.rpc.close().await;
    }
}

/// Explicit, caller-driven reconnect: tears down the current event stream
/// and re-establishes it plus a fresh tool listing.
pub async fn reconnect(transport: &Arc<SseTransport>) -> Result<Vec<Tool>> {
    transport.close().await;
    transport.connect().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn close_without_connect_is_a_noop() {
        let t = SseTransport::new("http://127.0.0.1:1/events", HashMap::new());
        t.close().await;
    }
}
