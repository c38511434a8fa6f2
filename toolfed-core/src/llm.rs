//! The LLM callable contract: external collaborators the
//! Agent Driver calls opaquely. Neither trait is implemented by this crate;
//! an embedder supplies concrete implementations that talk to a real model.

use crate::context::AgentContext;
use crate::error::Result;
use crate::types::ToolCall;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One message in a Chat-format rolling history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: Some(content.into()), tool_calls: None, tool_call_id: None }
    }

    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self { role: "assistant".into(), content: None, tool_calls: Some(tool_calls), tool_call_id: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatRequest {
    pub input: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub finish_reason: FinishReason,
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

impl ChatResponse {
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.choices
            .first()
            .and_then(|c| c.message.tool_calls.clone())
            .unwrap_or_default()
    }

    pub fn is_stop(&self) -> bool {
        self.choices.first().map(|c| c.finish_reason == FinishReason::Stop).unwrap_or(true)
    }
}

/// `ChatLLM(ctx, req) -> (resp, err)`.
#[async_trait]
pub trait ChatLlm: Send + Sync {
    async fn generate(&self, ctx: &AgentContext, req: ChatRequest) -> Result<ChatResponse>;
}

/// One item in a Responses-format heterogeneous output/input list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsesItem {
    Message { role: String, content: String },
    FunctionCall { call_id: String, name: String, arguments: Value },
    FunctionCallOutput { call_id: String, output: String },
}

impl ResponsesItem {
    pub fn as_tool_call(&self) -> Option<ToolCall> {
        match self {
            ResponsesItem::FunctionCall { call_id, name, arguments } => {
                Some(ToolCall::new(call_id.clone(), name.clone(), arguments.clone()))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResponsesRequest {
    pub input: Vec<ResponsesItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesOutput {
    pub output: Vec<ResponsesItem>,
}

impl ResponsesOutput {
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.output.iter().filter_map(ResponsesItem::as_tool_call).collect()
    }

    pub fn is_stop(&self) -> bool {
        self.tool_calls().is_empty()
    }
}

/// `ResponsesLLM(ctx, req) -> (resp, err)`.
#[async_trait]
pub trait ResponsesLlm: Send + Sync {
    async fn generate(&self, ctx: &AgentContext, req: ResponsesRequest) -> Result<ResponsesOutput>;
}
