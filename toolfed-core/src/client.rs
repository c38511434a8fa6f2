//! Declarative client configuration and connection state.

use crate::error::{Result, ToolfedError};
use crate::types::Tool;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A value that is either a literal string or resolved eagerly from an
/// environment variable at `AddClient` time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvResolve {
    Literal(String),
    FromEnv {
        #[serde(rename = "from-env")]
        from_env: bool,
        #[serde(rename = "env-var")]
        env_var: String,
    },
}

impl EnvResolve {
    pub fn literal(value: impl Into<String>) -> Self {
        EnvResolve::Literal(value.into())
    }

    pub fn from_env(var: impl Into<String>) -> Self {
        EnvResolve::FromEnv { from_env: true, env_var: var.into() }
    }

    /// Resolve to a concrete string, reading the environment once.
    /// Fails with `ConfigInvalid` if `from-env` is set but the variable is
    /// unset, matching "unset required variables cause AddClient to fail".
    pub fn resolve(&self) -> Result<String> {
        match self {
            EnvResolve::Literal(s) => Ok(s.clone()),
            EnvResolve::FromEnv { env_var, .. } => std::env::var(env_var).map_err(|_| {
                ToolfedError::ConfigInvalid(format!("required environment variable '{env_var}' is unset"))
            }),
        }
    }
}

/// The transport carrier used by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Http,
    Sse,
    Stdio,
    InProcess,
}

/// Subprocess launch configuration for the stdio transport.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StdioConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, EnvResolve>,
}

/// An allowlist of glob-or-literal tool name patterns.
///
/// `["*"]` means unrestricted; an empty list (or config field left absent)
/// means deny-all.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolAllowlist(pub Vec<String>);

impl ToolAllowlist {
    pub fn allow_all() -> Self {
        ToolAllowlist(vec!["*".to_string()])
    }

    pub fn deny_all() -> Self {
        ToolAllowlist(Vec::new())
    }

    pub fn is_allow_all(&self) -> bool {
        self.0.iter().any(|p| p == "*")
    }

    /// True if `local_name` matches any glob or literal pattern in this list.
    pub fn matches(&self, local_name: &str) -> bool {
        self.0.iter().any(|pattern| {
            if pattern == "*" {
                true
            } else if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
                glob::Pattern::new(pattern)
                    .map(|p| p.matches(local_name))
                    .unwrap_or(false)
            } else {
                pattern == local_name
            }
        })
    }

    /// Intersect with another allowlist: a literal `"*"` in `other` widens
    /// only to `self` (the config list), never beyond it.
    pub fn intersect(&self, other: &ToolAllowlist) -> ToolAllowlist {
        if other.0.is_empty() {
            return self.clone();
        }
        if other.is_allow_all() {
            return self.clone();
        }
        ToolAllowlist(other.0.iter().filter(|p| self.matches_pattern_str(p)).cloned().collect())
    }

    fn matches_pattern_str(&self, pattern: &str) -> bool {
        // A context-level pattern survives the intersection if the config
        // allowlist would admit at least the literal pattern text, or if the
        // config allowlist is itself unrestricted.
        self.is_allow_all() || self.matches(pattern)
    }
}

/// Declarative configuration for one MCP client connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub id: String,
    pub name: String,
    pub connection_type: ConnectionType,
    #[serde(default)]
    pub connection_string: Option<String>,
    #[serde(default)]
    pub stdio_config: Option<StdioConfig>,
    #[serde(default)]
    pub headers: HashMap<String, EnvResolve>,
    #[serde(default)]
    pub tools_to_execute: ToolAllowlist,
    #[serde(default)]
    pub tools_to_auto_execute: ToolAllowlist,
    #[serde(default)]
    pub is_code_mode_client: bool,
}

impl ClientConfig {
    /// Structural validation performed by `AddClient`/`EditClient`: raises
    /// `ConfigInvalid` and is never raised during invocation.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ToolfedError::ConfigInvalid("client name must not be empty".into()));
        }
        match self.connection_type {
            ConnectionType::Http | ConnectionType::Sse => {
                if self.connection_string.as_deref().unwrap_or("").trim().is_empty() {
                    return Err(ToolfedError::ConfigInvalid(format!(
                        "client '{}': {:?} transport requires connection_string",
                        self.name, self.connection_type
                    )));
                }
            }
            ConnectionType::Stdio => {
                if self.stdio_config.as_ref().map(|c| c.command.trim().is_empty()).unwrap_or(true) {
                    return Err(ToolfedError::ConfigInvalid(format!(
                        "client '{}': stdio transport requires stdio_config.command",
                        self.name
                    )));
                }
            }
            ConnectionType::InProcess => {}
        }
        Ok(())
    }

    /// Resolve every `{from-env: true, ...}` header value eagerly.
    pub fn resolved_headers(&self) -> Result<HashMap<String, String>> {
        let mut out = HashMap::with_capacity(self.headers.len());
        for (k, v) in &self.headers {
            out.insert(k.clone(), v.resolve()?);
        }
        Ok(out)
    }
}

/// Connection lifecycle state of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// Full runtime state of one registered client.
#[derive(Debug, Clone)]
pub struct ClientState {
    pub config: ClientConfig,
    pub state: ConnectionState,
    pub tools: HashMap<String, Tool>,
}

impl ClientState {
    pub fn new(config: ClientConfig) -> Self {
        Self { config, state: ConnectionState::Connecting, tools: HashMap::new() }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_resolve_literal_passes_through() {
        assert_eq!(EnvResolve::literal("abc").resolve().unwrap(), "abc");
    }

    #[test]
    fn env_resolve_missing_var_fails() {
        let r = EnvResolve::from_env("TOOLFED_TEST_DEFINITELY_UNSET_VAR_XYZ");
        assert!(matches!(r.resolve(), Err(ToolfedError::ConfigInvalid(_))));
    }

    #[test]
    fn allowlist_deny_all_by_default() {
        let al = ToolAllowlist::default();
        assert!(!al.matches("anything"));
    }

    #[test]
    fn allowlist_allow_all() {
        let al = ToolAllowlist::allow_all();
        assert!(al.matches("read_file"));
        assert!(al.matches("whatever"));
    }

    #[test]
    fn allowlist_glob_pattern() {
        let al = ToolAllowlist(vec!["read_*".to_string()]);
        assert!(al.matches("read_file"));
        assert!(!al.matches("write_file"));
    }

    #[test]
    fn allowlist_intersect_narrows() {
        let config = ToolAllowlist(vec!["read_file".to_string(), "list_dir".to_string()]);
        let ctx = ToolAllowlist(vec!["read_file".to_string()]);
        let result = config.intersect(&ctx);
        assert!(result.matches("read_file"));
        assert!(!result.matches("list_dir"));
    }

    #[test]
    fn allowlist_intersect_star_widens_only_to_config() {
        let config = ToolAllowlist(vec!["read_file".to_string()]);
        let ctx = ToolAllowlist::allow_all();
        let result = config.intersect(&ctx);
        assert!(result.matches("read_file"));
        assert!(!result.matches("delete_everything"));
    }

    #[test]
    fn allowlist_empty_context_does_not_narrow() {
        let config = ToolAllowlist(vec!["read_file".to_string()]);
        let ctx = ToolAllowlist::default();
        let result = config.intersect(&ctx);
        assert!(result.matches("read_file"));
    }

    #[test]
    fn client_config_validate_http_requires_url() {
        let cfg = ClientConfig {
            id: "1".into(),
            name: "srv".into(),
            connection_type: ConnectionType::Http,
            connection_string: None,
            stdio_config: None,
            headers: HashMap::new(),
            tools_to_execute: ToolAllowlist::allow_all(),
            tools_to_auto_execute: ToolAllowlist::default(),
            is_code_mode_client: false,
        };
        assert!(cfg.validate().is_err());
    }

    proptest::proptest! {
        /// Intersecting a config allowlist with any context allowlist never
        /// admits a name the config allowlist alone would reject — narrowing
        /// is monotonic regardless of how `other` is built.
        #[test]
        fn intersect_never_admits_beyond_config(
            config_literal in "[a-z]{1,8}",
            other_literal in "[a-z]{1,8}",
            probe in "[a-z]{1,8}",
        ) {
            let config = ToolAllowlist(vec![config_literal.clone()]);
            let other = ToolAllowlist(vec![other_literal]);
            let narrowed = config.intersect(&other);
            if narrowed.matches(&probe) {
                assert!(config.matches(&probe));
            }
        }

        #[test]
        fn allow_all_config_intersect_is_identity_on_other(other_literal in "[a-z]{1,8}") {
            let config = ToolAllowlist::allow_all();
            let other = ToolAllowlist(vec![other_literal.clone()]);
            let narrowed = config.intersect(&other);
            assert!(narrowed.matches(&other_literal));
        }
    }

    #[test]
    fn client_config_validate_in_process_needs_nothing() {
        let cfg = ClientConfig {
            id: "1".into(),
            name: "toolfedInternal".into(),
            connection_type: ConnectionType::InProcess,
            connection_string: None,
            stdio_config: None,
            headers: HashMap::new(),
            tools_to_execute: ToolAllowlist::allow_all(),
            tools_to_auto_execute: ToolAllowlist::allow_all(),
            is_code_mode_client: true,
        };
        assert!(cfg.validate().is_ok());
    }
}
