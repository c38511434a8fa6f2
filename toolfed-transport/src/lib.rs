//! Concrete transport carriers implementing `toolfed_core::Transport`:
//! HTTP, SSE, stdio (subprocess), and in-process.

mod http;
mod inprocess;
mod rpc;
mod sse;
mod stdio;

pub use http::HttpTransport;
pub use inprocess::{Handler, HandlerFuture, InProcessTransport, RawHandler, RawHandlerFuture};
pub use rpc::{CallToolResult, ContentBlock, JsonRpcRequest, JsonRpcResponse, ListToolsResult, McpToolDescriptor};
pub use sse::{reconnect as sse_reconnect, SseTransport};
pub use stdio::StdioTransport;
