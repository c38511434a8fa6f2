//! The pre/post hook chain wrapped around every tool invocation, with
//! short-circuit support and mirrored post-hook execution.

mod chain;
mod hooks;

pub use chain::PluginChain;
pub use hooks::{HookRequest, Plugin, PreHookOutcome};
