//! Core traits and types shared by the tool federation and agent execution
//! crates: the data model from spec §3, the error taxonomy from spec §7,
//! the fused request context from spec §9, and the transport/LLM
//! collaborator contracts from spec §6.

mod client;
mod context;
mod error;
mod llm;
mod manager;
mod transport;
pub mod types;

pub use client::{
    ClientConfig, ClientState, ConnectionState, ConnectionType, EnvResolve, StdioConfig,
    ToolAllowlist,
};
pub use context::{AgentContext, ContextFilter};
pub use error::{Result, ToolfedError};
pub use llm::{
    ChatLlm, ChatMessage, ChatRequest, ChatResponse, ChatChoice, FinishReason, ResponsesItem,
    ResponsesLlm, ResponsesOutput, ResponsesRequest,
};
pub use manager::{FetchNewRequestId, ManagerConfig};
pub use transport::{Transport, TransportToolResult};
pub use types::{
    normalize_client_name, qualify, split_qualified, ChatToolMessage, ResponsesFunctionCallOutput,
    Tool, ToolCall, ToolResult, ToolResultMessage, WireFormat, IN_PROCESS_CLIENT_ALIAS,
    IN_PROCESS_CLIENT_NAME,
};
