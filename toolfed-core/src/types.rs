//! Wire-level data model: tools, tool calls, tool results, and the two
//! supported LLM wire formats.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The reserved client name for the in-process (built-in) client.
pub const IN_PROCESS_CLIENT_NAME: &str = "toolfedInternal";

/// A historical alias accepted on input only: the in-process client used a
/// differently-cased prefix at one point, and this lets old configs keep
/// working without ever producing the old spelling on output.
pub const IN_PROCESS_CLIENT_ALIAS: &str = "bifrostInternal";

/// Separator between client name and local tool name in a qualified name.
pub const QUALIFIED_NAME_SEP: char = '-';

/// A tool declared by an MCP client: local name, description, and JSON
/// schema for its parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub client_name: String,
    pub local_name: String,
    pub description: String,
    pub parameters_schema: Value,
}

impl Tool {
    pub fn new(
        client_name: impl Into<String>,
        local_name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: Value,
    ) -> Self {
        Self {
            client_name: client_name.into(),
            local_name: local_name.into(),
            description: description.into(),
            parameters_schema,
        }
    }

    /// The globally unique handle for this tool: `<client-name>-<tool-name>`.
    pub fn qualified_name(&self) -> String {
        qualify(&self.client_name, &self.local_name)
    }
}

/// Build a qualified name from a client name and a local tool name.
pub fn qualify(client_name: &str, local_name: &str) -> String {
    format!("{client_name}{QUALIFIED_NAME_SEP}{local_name}")
}

/// Split a qualified name into `(client_name, local_name)` by the first
/// occurrence of the separator from the left, normalizing the in-process
/// alias to its canonical form.
///
/// Splitting on the first separator is a heuristic: client names may
/// themselves contain `-`. Callers that maintain a registry should prefer
/// resolving against known client names (see `toolfed-registry`) rather
/// than relying solely on this split.
pub fn split_qualified(qualified: &str) -> Option<(&str, &str)> {
    let normalized = qualified;
    let (client, local) = normalized.split_once(QUALIFIED_NAME_SEP)?;
    Some((client, local))
}

/// Normalize the in-process client alias to its canonical name.
pub fn normalize_client_name(name: &str) -> &str {
    if name == IN_PROCESS_CLIENT_ALIAS {
        IN_PROCESS_CLIENT_NAME
    } else {
        name
    }
}

/// A request from the model to invoke one tool.
///
/// `id` is opaque to the core and preserved verbatim end-to-end. It may be
/// empty, may collide with other calls in the same turn, and may contain any
/// octet sequence a caller cares to put in it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub qualified_name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, qualified_name: impl Into<String>, arguments: Value) -> Self {
        Self { id: id.into(), qualified_name: qualified_name.into(), arguments }
    }

    /// Split this call's qualified name into `(client, local_name)`.
    pub fn split_name(&self) -> Option<(&str, &str)> {
        split_qualified(&self.qualified_name)
    }
}

/// The result of executing one tool call.
///
/// `content` is always a JSON-encoded string in the Chat wire format and a
/// plain string in the Responses wire format (the distinction lives in the
/// adapter, not in this type — `content` here is always the raw payload
/// string and `id` always matches the originating [`ToolCall::id`]
/// byte-for-byte).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { id: id.into(), content: content.into(), is_error: false }
    }

    pub fn error(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { id: id.into(), content: content.into(), is_error: true }
    }
}

/// The two LLM wire formats the invoker can adapt a [`ToolResult`] into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    Chat,
    Responses,
}

/// `{role: "tool", tool_call_id, content}` — Chat format tool message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatToolMessage {
    pub role: &'static str,
    pub tool_call_id: String,
    pub content: String,
}

/// `{type: "function_call_output", call_id, output}` — Responses format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "function_call_output")]
pub struct ResponsesFunctionCallOutput {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub call_id: String,
    pub output: String,
}

/// A tool-result message in either wire format, returned by the invoker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultMessage {
    Chat(ChatToolMessage),
    Responses(ResponsesFunctionCallOutput),
}

impl ToolResultMessage {
    /// Build the wire message for `result` in the requested `format`. The
    /// call id is preserved byte-for-byte irrespective of format.
    pub fn from_result(result: &ToolResult, format: WireFormat) -> Self {
        match format {
            WireFormat::Chat => ToolResultMessage::Chat(ChatToolMessage {
                role: "tool",
                tool_call_id: result.id.clone(),
                content: result.content.clone(),
            }),
            WireFormat::Responses => {
                ToolResultMessage::Responses(ResponsesFunctionCallOutput {
                    kind: "function_call_output",
                    call_id: result.id.clone(),
                    output: result.content.clone(),
                })
            }
        }
    }

    /// The call id this message carries, regardless of format.
    pub fn call_id(&self) -> &str {
        match self {
            ToolResultMessage::Chat(m) => &m.tool_call_id,
            ToolResultMessage::Responses(m) => &m.call_id,
        }
    }
}
