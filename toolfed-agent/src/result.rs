//! Outcomes returned by [`crate::AgentDriver`]: the reasons a loop stops,
//! and the partial-result-plus-error contract an abort carries.

use toolfed_core::{ChatMessage, ResponsesItem, ToolfedError};

/// Why the loop stopped running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model returned no tool calls.
    Stop,
    /// An admissible-but-non-auto tool call was present; the caller must
    /// resolve it (approve/deny) before the loop can continue.
    Approval,
    /// `max-agent-depth` iterations were spent without a `Stop`/`Approval`.
    DepthReached,
}

#[derive(Debug, Clone)]
pub struct ChatAgentResult {
    pub history: Vec<ChatMessage>,
    pub stop_reason: StopReason,
    pub iterations: u32,
}

#[derive(Debug, Clone)]
pub struct ResponsesAgentResult {
    pub history: Vec<ResponsesItem>,
    pub stop_reason: StopReason,
    pub iterations: u32,
}

/// A loop abort that still carries whatever history was assembled up to
/// the failing step: the caller always receives a (partial-result, error)
/// pair rather than losing prior turns on a fatal error.
#[derive(Debug, thiserror::Error)]
#[error("agent loop aborted: {error}")]
pub struct AgentError<T: std::fmt::Debug> {
    #[source]
    pub error: ToolfedError,
    pub partial: T,
}
