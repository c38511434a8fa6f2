//! The code-mode sandbox: a single-threaded, capability-constrained
//! interpreter for the `executeToolCode` built-in tool.
//!
//! The guest program's only visible surface is a bound `<client>.<tool>(...)`
//! proxy per connected MCP client — no filesystem, no network, no clock
//! beyond the monotonic reference used to enforce the execution timeout.
//! Everything else (which tools exist, how a call actually reaches a
//! transport) is injected by the caller through [`ToolBridge`] and
//! [`ClientBinding`]; this crate has no dependency on `toolfed-registry` or
//! `toolfed-invoker` so it can be embedded or tested in isolation.

mod engine;
mod outcome;

pub use engine::{ClientBinding, SandboxExecutor, ToolBridge, ToolSpec};
pub use outcome::{is_error_marker, is_success_marker, ExecutionReport};
