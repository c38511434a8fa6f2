//! `ToolInvoker`: the single chokepoint for executing one tool call —
//! resolve, filter, plugin chain, dispatch, wire-format adapt.

mod invoker;

pub use invoker::ToolInvoker;
