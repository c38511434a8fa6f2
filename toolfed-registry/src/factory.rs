//! Builds a [`Transport`] for a [`ClientConfig`].
//!
//! The default factory is swappable so an embedding application (or a test)
//! can substitute its own transports — e.g. routing every `Http` client
//! through a mock — without touching the registry itself.

use std::collections::HashMap;
use std::sync::Arc;

use toolfed_core::{ClientConfig, ConnectionType, Result, ToolfedError, Transport};
use toolfed_transport::{HttpTransport, InProcessTransport, SseTransport, StdioTransport};

/// Constructs the transport carrier for one client, from its declarative
/// configuration. Environment-resolved values (`EnvResolve`) are resolved
/// here, once, at build time.
pub trait TransportFactory: Send + Sync {
    fn create(&self, config: &ClientConfig) -> Result<Arc<dyn Transport>>;
}

/// The stock factory backing `http`/`sse`/`stdio`/`in_process` connection
/// types with the carriers in `toolfed-transport`. `in_process` clients all
/// share the single [`InProcessTransport`] instance this factory was built
/// with, so handlers registered on it are visible the moment a client of
/// that type is added.
pub struct DefaultTransportFactory {
    in_process: InProcessTransport,
}

impl DefaultTransportFactory {
    pub fn new(in_process: InProcessTransport) -> Self {
        Self { in_process }
    }

    pub fn in_process(&self) -> &InProcessTransport {
        &self.in_process
    }
}

impl TransportFactory for DefaultTransportFactory {
    fn create(&self, config: &ClientConfig) -> Result<Arc<dyn Transport>> {
        match config.connection_type {
            ConnectionType::Http => {
                let endpoint = config
                    .connection_string
                    .clone()
                    .ok_or_else(|| ToolfedError::ConfigInvalid(format!("client '{}': missing connection_string", config.name)))?;
                Ok(Arc::new(HttpTransport::new(endpoint, config.resolved_headers()?)))
            }
            ConnectionType::Sse => {
                let endpoint = config
                    .connection_string
                    .clone()
                    .ok_or_else(|| ToolfedError::ConfigInvalid(format!("client '{}': missing connection_string", config.name)))?;
                Ok(Arc::new(SseTransport::new(endpoint, config.resolved_headers()?)))
            }
            ConnectionType::Stdio => {
                let stdio = config
                    .stdio_config
                    .clone()
                    .ok_or_else(|| ToolfedError::ConfigInvalid(format!("client '{}': missing stdio_config", config.name)))?;
                let mut env = HashMap::with_capacity(stdio.env.len());
                for (k, v) in &stdio.env {
                    env.insert(k.clone(), v.resolve()?);
                }
                Ok(Arc::new(StdioTransport::new(stdio.command, stdio.args, env)))
            }
            ConnectionType::InProcess => Ok(Arc::new(self.in_process.clone())),
        }
    }
}
