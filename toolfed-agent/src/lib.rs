//! `AgentDriver`: the iterative model/tool loop, plus the
//! built-in `executeToolCode` code-mode tool that binds the sandboxed
//! interpreter in `toolfed-sandbox` to a live federation of MCP clients.

mod code_mode;
mod driver;
mod partition;
mod result;

pub use code_mode::{install_code_mode_tool, CODE_MODE_TOOL_NAME};
pub use driver::AgentDriver;
pub use partition::{classify, executable, has_approval, CallKind, ClassifiedCall};
pub use result::{AgentError, ChatAgentResult, ResponsesAgentResult, StopReason};
