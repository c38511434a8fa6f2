//! The fused, request-scoped context carried through one agent invocation.
//!
//! Deadline, cancellation and the well-known key/value mapping are fused
//! into a single type rather than threaded separately.

use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::client::ToolAllowlist;

/// Context-level filter override read from well-known context keys.
/// `Unset` leaves the config allowlist untouched; `All` is the literal
/// `"*"` sentinel (widens only to the config allowlist); `Only` restricts
/// to the listed names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextFilter {
    Unset,
    All,
    Only(Vec<String>),
}

impl Default for ContextFilter {
    fn default() -> Self {
        ContextFilter::Unset
    }
}

impl ContextFilter {
    pub fn only(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        ContextFilter::Only(names.into_iter().map(Into::into).collect())
    }

    /// Render this filter as a [`ToolAllowlist`] for intersection against a
    /// client's configured allowlist.
    pub fn as_allowlist(&self) -> ToolAllowlist {
        match self {
            ContextFilter::Unset => ToolAllowlist::default(),
            ContextFilter::All => ToolAllowlist::allow_all(),
            ContextFilter::Only(names) => ToolAllowlist(names.clone()),
        }
    }

    /// `Unset` is treated as "no restriction" during intersection (see
    /// [`crate::client::ToolAllowlist::intersect`]), so an unset context
    /// filter must not narrow the config allowlist at all.
    pub fn is_unset(&self) -> bool {
        matches!(self, ContextFilter::Unset)
    }
}

/// A per-request, value-carrying context shared across one agent
/// invocation's iterations.
///
/// Cloning an `AgentContext` clones the `Arc` handles, so all clones observe
/// the same `request_id`/`original_request_id` mutations and the same
/// cancellation/deadline.
#[derive(Clone)]
pub struct AgentContext {
    request_id: Arc<RwLock<String>>,
    original_request_id: Arc<RwLock<Option<String>>>,
    include_clients: Arc<ContextFilter>,
    include_tools: Arc<ContextFilter>,
    deadline: Option<Instant>,
    cancellation: CancellationToken,
}

impl AgentContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: Arc::new(RwLock::new(request_id.into())),
            original_request_id: Arc::new(RwLock::new(None)),
            include_clients: Arc::new(ContextFilter::Unset),
            include_tools: Arc::new(ContextFilter::Unset),
            deadline: None,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_include_clients(mut self, filter: ContextFilter) -> Self {
        self.include_clients = Arc::new(filter);
        self
    }

    pub fn with_include_tools(mut self, filter: ContextFilter) -> Self {
        self.include_tools = Arc::new(filter);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.with_deadline(deadline)
    }

    /// Record the `request_id` present at entry as `original_request_id`,
    /// if it has not already been set. Idempotent: never overwrites an
    /// existing value, for the life of this (and all cloned) context.
    pub fn capture_original_request_id(&self) {
        let mut guard = self.original_request_id.write().unwrap();
        if guard.is_none() {
            *guard = Some(self.request_id());
        }
    }

    pub fn request_id(&self) -> String {
        self.request_id.read().unwrap().clone()
    }

    pub fn original_request_id(&self) -> Option<String> {
        self.original_request_id.read().unwrap().clone()
    }

    /// Update the current `request_id`. A no-op for an empty `new_id`: a
    /// fetch-new-request-id callback that returns `""` leaves the
    /// request-id unchanged rather than clearing it.
    pub fn set_request_id(&self, new_id: impl Into<String>) {
        let new_id = new_id.into();
        if new_id.is_empty() {
            return;
        }
        *self.request_id.write().unwrap() = new_id;
    }

    pub fn include_clients(&self) -> &ContextFilter {
        &self.include_clients
    }

    pub fn include_tools(&self) -> &ContextFilter {
        &self.include_tools
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled() || self.deadline.map(|d| Instant::now() >= d).unwrap_or(false)
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Derive a bounded child context for one tool invocation: the deadline
    /// is `min(self.deadline, now + tool_execution_timeout)`. Cancellation
    /// is a shared token, not a child: a sibling's fatal error must not
    /// cancel others, but the caller's own cancellation must still
    /// propagate down to it.
    pub fn derive_for_tool_call(&self, tool_execution_timeout: Duration) -> AgentContext {
        let candidate = Instant::now() + tool_execution_timeout;
        let deadline = match self.deadline {
            Some(existing) => existing.min(candidate),
            None => candidate,
        };
        Self {
            request_id: self.request_id.clone(),
            original_request_id: self.original_request_id.clone(),
            include_clients: self.include_clients.clone(),
            include_tools: self.include_tools.clone(),
            deadline: Some(deadline),
            cancellation: self.cancellation.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn original_request_id_set_once() {
        let ctx = AgentContext::new("req-1");
        ctx.capture_original_request_id();
        ctx.set_request_id("req-1-iter-1");
        ctx.capture_original_request_id();
        assert_eq!(ctx.original_request_id().as_deref(), Some("req-1"));
        assert_eq!(ctx.request_id(), "req-1-iter-1");
    }

    #[test]
    fn empty_new_id_leaves_request_id_unchanged() {
        let ctx = AgentContext::new("req-X");
        ctx.set_request_id("");
        assert_eq!(ctx.request_id(), "req-X");
    }

    #[tokio::test(start_paused = true)]
    async fn derive_for_tool_call_bounds_to_min_deadline() {
        let ctx = AgentContext::new("r").with_timeout(Duration::from_secs(10));
        let child = ctx.derive_for_tool_call(Duration::from_secs(1));
        assert!(child.deadline().unwrap() <= ctx.deadline().unwrap());
    }

    #[test]
    fn cancellation_shared_across_clones() {
        let ctx = AgentContext::new("r");
        let clone = ctx.clone();
        clone.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn sibling_cancellation_not_isolated_by_derive() {
        // derive_for_tool_call shares the cancellation token: one sibling's
        // cancellation token is the same object, matching the "no rollback,
        // cancellation propagates downward" model. Per-call *deadlines* are
        // independent even though the token is shared.
        let ctx = AgentContext::new("r");
        let child_a = ctx.derive_for_tool_call(Duration::from_secs(5));
        let child_b = ctx.derive_for_tool_call(Duration::from_secs(5));
        ctx.cancel();
        assert!(child_a.is_cancelled());
        assert!(child_b.is_cancelled());
    }
}
