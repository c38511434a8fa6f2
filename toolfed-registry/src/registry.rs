//! `ClientRegistry`: client lifecycle, tool inventory, and allowlist
//! evaluation across the federation.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use toolfed_core::{
    AgentContext, ClientConfig, ClientState, ConnectionState, ContextFilter, Result, Tool,
    ToolfedError, Transport, IN_PROCESS_CLIENT_ALIAS, IN_PROCESS_CLIENT_NAME,
};

use crate::factory::TransportFactory;

struct Entry {
    state: ClientState,
    transport: Arc<dyn Transport>,
}

/// A tool resolved against the registry: the transport to invoke it on, and
/// the local (unqualified) name the transport expects.
pub struct ResolvedTool {
    pub client_id: String,
    pub client_name: String,
    pub local_name: String,
    pub transport: Arc<dyn Transport>,
}

/// Owns every registered client's configuration, connection state, tool
/// inventory and transport handle.
///
/// One `RwLock` guards the whole map: additions/removals/edits take the
/// write half, while listing clients/tools and resolving a call take the
/// read half: reads vastly outnumber writes, and writes take the
/// exclusive lock only for the brief span of a config change.
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, Entry>>,
    factory: Arc<dyn TransportFactory>,
}

impl ClientRegistry {
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self { clients: RwLock::new(HashMap::new()), factory }
    }

    /// Register a new client. Validates the configuration eagerly
    /// (`ToolfedError::ConfigInvalid` on malformed input or a colliding
    /// id/name); the subsequent connection attempt is best-effort — a
    /// handshake failure leaves the client in `ConnectionState::Error`
    /// rather than failing this call, so that `GetClients` remains the
    /// single source of truth for connectivity.
    pub async fn add_client(&self, config: ClientConfig) -> Result<()> {
        config.validate()?;

        let mut guard = self.clients.write().await;
        if guard.contains_key(&config.id) {
            return Err(ToolfedError::ConfigInvalid(format!("client id '{}' already registered", config.id)));
        }
        if guard.values().any(|e| e.state.config.name == config.name) {
            return Err(ToolfedError::ConfigInvalid(format!("client name '{}' already registered", config.name)));
        }

        let transport = self.factory.create(&config)?;
        let mut state = ClientState::new(config);
        Self::connect(&transport, &mut state).await;
        let id = state.config.id.clone();
        guard.insert(id, Entry { state, transport });
        Ok(())
    }

    /// Replace an existing client's configuration, reconnecting under the
    /// new settings. The id is preserved; the name may change so long as it
    /// does not collide with another registered client.
    pub async fn edit_client(&self, id: &str, config: ClientConfig) -> Result<()> {
        config.validate()?;

        let mut guard = self.clients.write().await;
        if !guard.contains_key(id) {
            return Err(ToolfedError::ClientUnavailable(id.to_string()));
        }
        if guard.iter().any(|(other_id, e)| other_id != id && e.state.config.name == config.name) {
            return Err(ToolfedError::ConfigInvalid(format!("client name '{}' already registered", config.name)));
        }

        if let Some(old) = guard.remove(id) {
            old.transport.close().await;
        }

        let transport = self.factory.create(&config)?;
        let mut state = ClientState::new(config);
        state.config.id = id.to_string();
        Self::connect(&transport, &mut state).await;
        guard.insert(id.to_string(), Entry { state, transport });
        Ok(())
    }

    pub async fn remove_client(&self, id: &str) -> Result<()> {
        let mut guard = self.clients.write().await;
        let entry = guard.remove(id).ok_or_else(|| ToolfedError::ClientUnavailable(id.to_string()))?;
        entry.transport.close().await;
        Ok(())
    }

    /// Explicit, caller-driven reconnect: tear down and re-establish the
    /// transport, refreshing the tool inventory. Never invoked automatically
    /// by the registry itself — callers drive reconnects explicitly.
    pub async fn reconnect_client(&self, id: &str) -> Result<()> {
        let mut guard = self.clients.write().await;
        let entry = guard.get_mut(id).ok_or_else(|| ToolfedError::ClientUnavailable(id.to_string()))?;
        entry.transport.close().await;
        Self::connect(&entry.transport, &mut entry.state).await;
        Ok(())
    }

    pub async fn get_clients(&self) -> Vec<ClientState> {
        self.clients.read().await.values().map(|e| e.state.clone()).collect()
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn connected_count(&self) -> usize {
        self.clients.read().await.values().filter(|e| e.state.is_connected()).count()
    }

    pub async fn tool_count(&self) -> usize {
        self.clients.read().await.values().map(|e| e.state.tools.len()).sum()
    }

    /// Every tool visible under `ctx`: the union of connected clients'
    /// inventories, each filtered through `tools_to_execute` intersected
    /// with `ctx.include_tools()`, and clients themselves filtered through
    /// `ctx.include_clients()`.
    pub async fn available_tools(&self, ctx: &AgentContext) -> Vec<Tool> {
        let guard = self.clients.read().await;
        let ctx_tools = ctx.include_tools().as_allowlist();

        let mut out = Vec::new();
        for entry in guard.values() {
            if !entry.state.is_connected() {
                continue;
            }
            if !client_passes_filter(&entry.state.config.name, ctx.include_clients()) {
                continue;
            }
            let effective = entry.state.config.tools_to_execute.intersect(&ctx_tools);
            for tool in entry.state.tools.values() {
                if effective.matches(&tool.local_name) {
                    out.push(Tool::new(entry.state.config.name.clone(), tool.local_name.clone(), tool.description.clone(), tool.parameters_schema.clone()));
                }
            }
        }
        out
    }

    /// Resolve a qualified tool name to the transport that can invoke it,
    /// verifying the owning client is connected and that both the
    /// client-level and tool-level context filters admit it.
    ///
    /// Qualified names are resolved against known client names rather than
    /// split naively on the first separator, since client names may
    /// themselves contain `-`.
    pub async fn resolve_tool(&self, ctx: &AgentContext, qualified_name: &str) -> Result<ResolvedTool> {
        let guard = self.clients.read().await;

        let mut matches: Vec<(&String, &Entry, String)> = Vec::new();
        for (id, entry) in guard.iter() {
            let name = &entry.state.config.name;
            let candidates: Vec<&str> =
                if name == IN_PROCESS_CLIENT_NAME { vec![IN_PROCESS_CLIENT_NAME, IN_PROCESS_CLIENT_ALIAS] } else { vec![name.as_str()] };
            for candidate in &candidates {
                let prefix = format!("{candidate}-");
                if let Some(rest) = qualified_name.strip_prefix(&prefix) {
                    if entry.state.tools.contains_key(rest) {
                        matches.push((id, entry, rest.to_string()));
                    }
                }
            }
        }

        let (id, entry, local_name) = match matches.len() {
            1 => matches.remove(0),
            0 => return Err(ToolfedError::ToolNotFound(qualified_name.to_string())),
            _ => {
                warn!(qualified_name, "ambiguous qualified tool name matches more than one registered client");
                return Err(ToolfedError::ToolNotFound(qualified_name.to_string()));
            }
        };

        if !entry.state.is_connected() {
            return Err(ToolfedError::ClientUnavailable(entry.state.config.name.clone()));
        }
        if !client_passes_filter(&entry.state.config.name, ctx.include_clients()) {
            return Err(ToolfedError::ToolFiltered(qualified_name.to_string()));
        }

        let ctx_tools = ctx.include_tools().as_allowlist();
        let effective = entry.state.config.tools_to_execute.intersect(&ctx_tools);
        if !effective.matches(&local_name) {
            return Err(ToolfedError::ToolFiltered(qualified_name.to_string()));
        }

        Ok(ResolvedTool {
            client_id: id.clone(),
            client_name: entry.state.config.name.clone(),
            local_name,
            transport: entry.transport.clone(),
        })
    }

    /// Whether `local_name` on `client_name` is eligible for unattended
    /// (auto) execution: connected, execute-allowlisted, and
    /// auto-execute-allowlisted. Used by the agent driver to partition tool
    /// calls.
    pub async fn is_auto_executable(&self, ctx: &AgentContext, client_name: &str, local_name: &str) -> bool {
        let guard = self.clients.read().await;
        let Some(entry) = guard.values().find(|e| e.state.config.name == client_name) else {
            return false;
        };
        if !entry.state.is_connected() {
            return false;
        }
        if !client_passes_filter(client_name, ctx.include_clients()) {
            return false;
        }
        let ctx_tools = ctx.include_tools().as_allowlist();
        let execute = entry.state.config.tools_to_execute.intersect(&ctx_tools);
        let auto = entry.state.config.tools_to_auto_execute.intersect(&ctx_tools);
        execute.matches(local_name) && auto.matches(local_name)
    }

    async fn connect(transport: &Arc<dyn Transport>, state: &mut ClientState) {
        state.state = ConnectionState::Connecting;
        match transport.connect().await {
            Ok(tools) => {
                state.tools = tools
                    .into_iter()
                    .map(|t| (t.local_name.clone(), Tool::new(state.config.name.clone(), t.local_name, t.description, t.parameters_schema)))
                    .collect();
                state.state = ConnectionState::Connected;
                info!(client = %state.config.name, tool_count = state.tools.len(), "client connected");
            }
            Err(e) => {
                warn!(client = %state.config.name, error = %e, "client connect failed");
                state.state = ConnectionState::Error;
            }
        }
    }
}

fn client_passes_filter(client_name: &str, filter: &ContextFilter) -> bool {
    match filter {
        ContextFilter::Unset | ContextFilter::All => true,
        ContextFilter::Only(names) => names.iter().any(|n| n == client_name),
    }
}
