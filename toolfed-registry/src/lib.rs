//! Client federation registry: lifecycle management for
//! registered MCP clients, their tool inventories, and allowlist-aware
//! resolution of qualified tool names to an invocable transport.

mod factory;
mod registry;

pub use factory::{DefaultTransportFactory, TransportFactory};
pub use registry::{ClientRegistry, ResolvedTool};
