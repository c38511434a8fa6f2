//! Error taxonomy for the tool federation core.
//!
//! Each variant corresponds to one of the error kinds named in the core's
//! specification. `ToolReportedError` is deliberately absent here: a tool
//! that executes and reports failure is carried as a [`crate::ToolResult`]
//! with `is_error = true`, never as an `Err`.

#[derive(Debug, thiserror::Error)]
pub enum ToolfedError {
    #[error("invalid client configuration: {0}")]
    ConfigInvalid(String),

    #[error("client '{0}' is not connected")]
    ClientUnavailable(String),

    #[error("tool '{0}' not found")]
    ToolNotFound(String),

    #[error("tool '{0}' is excluded by allowlist")]
    ToolFiltered(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("plugin error: {0}")]
    Plugin(String),

    #[error("sandbox error: {0}")]
    Sandbox(String),

    #[error("maximum agent depth reached")]
    MaxDepthReached,

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ToolfedError>;

impl ToolfedError {
    /// True for errors that abort the whole invocation/agent loop rather
    /// than being convertible into a per-call `ToolResult`.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ToolfedError::Cancelled | ToolfedError::Plugin(_))
    }
}
