//! Manager-wide configuration.

use crate::context::AgentContext;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Async callback invoked once per agent iteration to refresh `request-id`.
/// A `None`/empty return leaves `request-id` unchanged.
pub type FetchNewRequestId =
    Arc<dyn Fn(AgentContext) -> Pin<Box<dyn Future<Output = Option<String>> + Send>> + Send + Sync>;

/// Process-wide knobs for the agent driver and tool invoker.
#[derive(Clone)]
pub struct ManagerConfig {
    pub max_agent_depth: u32,
    pub tool_execution_timeout: Duration,
    pub fetch_new_request_id: Option<FetchNewRequestId>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_agent_depth: 10,
            tool_execution_timeout: Duration::from_secs(30),
            fetch_new_request_id: None,
        }
    }
}

impl std::fmt::Debug for ManagerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerConfig")
            .field("max_agent_depth", &self.max_agent_depth)
            .field("tool_execution_timeout", &self.tool_execution_timeout)
            .field("fetch_new_request_id", &self.fetch_new_request_id.is_some())
            .finish()
    }
}

impl ManagerConfig {
    pub fn with_max_agent_depth(mut self, depth: u32) -> Self {
        self.max_agent_depth = depth;
        self
    }

    pub fn with_tool_execution_timeout(mut self, timeout: Duration) -> Self {
        self.tool_execution_timeout = timeout;
        self
    }

    pub fn with_fetch_new_request_id(mut self, f: FetchNewRequestId) -> Self {
        self.fetch_new_request_id = Some(f);
        self
    }
}
