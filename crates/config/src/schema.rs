//! Config schema types (sandbox, orchestrator timings, backends).

use std::{collections::HashMap, time::Duration};

use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
};

/// Default MCP endpoint path on a backend.
pub const DEFAULT_MCP_PATH: &str = "/mcp";

/// First port handed out to backends that do not set one; backend `i`
/// defaults to `DEFAULT_BASE_PORT + i`.
pub const DEFAULT_BASE_PORT: u16 = 3000;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct McpboxConfig {
    pub sandbox: SandboxConfig,
    pub orchestrator: OrchestratorConfig,
    /// Backends in setup order. Order matters for provisioning and for the
    /// `reject` collision policy.
    pub backends: Vec<BackendConfig>,
}

/// Which sandbox runtime hosts the backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SandboxBackend {
    #[default]
    Docker,
    /// Run on the host with no isolation. Useful for local development.
    Host,
}

impl std::fmt::Display for SandboxBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Docker => write!(f, "docker"),
            Self::Host => write!(f, "host"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub backend: SandboxBackend,
    /// Name prefix for the sandbox (container name for docker).
    pub name: String,
    pub image: String,
    /// Long-running command that keeps the sandbox alive between execs.
    pub keepalive_command: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            backend: SandboxBackend::default(),
            name: "sandbox-mcp-env".into(),
            image: "node:22-slim".into(),
            keepalive_command: "tail -f /dev/null".into(),
        }
    }
}

/// What to do when two backends register a tool with the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// The first backend (in config order) keeps the name; later duplicates
    /// are not registered and are reported.
    #[default]
    Reject,
    /// Register every tool as `<backend>__<tool>`.
    Prefix,
    /// A later backend replaces the earlier registration.
    LastWins,
}

impl std::fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reject => write!(f, "reject"),
            Self::Prefix => write!(f, "prefix"),
            Self::LastWins => write!(f, "last_wins"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Wait paid once after all ports are exposed (certificate issuance,
    /// ingress propagation).
    pub network_ready_delay_secs: u64,
    /// Timeout for each provisioning command.
    pub command_timeout_secs: u64,
    /// Timeout for launching a backend's start command.
    pub start_timeout_secs: u64,
    /// Timeout for one backend's handshake + tool listing; 0 disables it.
    pub connect_timeout_secs: u64,
    /// How long a disconnect waits for the session task before aborting it.
    pub disconnect_timeout_secs: u64,
    pub collision_policy: CollisionPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            network_ready_delay_secs: 180,
            command_timeout_secs: 600,
            start_timeout_secs: 10,
            connect_timeout_secs: 60,
            disconnect_timeout_secs: 5,
            collision_policy: CollisionPolicy::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn network_ready_delay(&self) -> Duration {
        Duration::from_secs(self.network_ready_delay_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_secs(self.disconnect_timeout_secs)
    }
}

/// One backend MCP server hosted in the sandbox.
///
/// Field aliases accept the older `server_*` / `mcp_*` key names.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    #[serde(alias = "server_start_cmd")]
    pub start_command: String,
    /// Environment for the start command. Values usually hold API keys.
    #[serde(default, alias = "server_env")]
    pub env: HashMap<String, Secret<String>>,
    /// Shell commands run in order before the start command.
    #[serde(default, alias = "pre_install_cmds")]
    pub provision: Vec<String>,
    #[serde(default, alias = "mcp_port")]
    pub port: Option<u16>,
    #[serde(default = "default_mcp_path", alias = "mcp_path")]
    pub path: String,
    /// Extra HTTP headers sent on every MCP request.
    #[serde(default)]
    pub headers: HashMap<String, Secret<String>>,
    /// When set, only these tools are exposed to the agent.
    #[serde(default)]
    pub allowed_tools: Option<Vec<String>>,
}

fn default_mcp_path() -> String {
    DEFAULT_MCP_PATH.into()
}

impl BackendConfig {
    pub fn new(name: impl Into<String>, start_command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start_command: start_command.into(),
            env: HashMap::new(),
            provision: Vec::new(),
            port: None,
            path: default_mcp_path(),
            headers: HashMap::new(),
            allowed_tools: None,
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn with_provision(mut self, commands: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.provision = commands.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), Secret::new(value.into()));
        self
    }

    #[must_use]
    pub fn with_allowed_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    /// Port the backend listens on, defaulting by position in the backend list.
    pub fn effective_port(&self, index: usize) -> u16 {
        self.port.unwrap_or_else(|| {
            u16::try_from(index)
                .ok()
                .and_then(|i| DEFAULT_BASE_PORT.checked_add(i))
                .unwrap_or(DEFAULT_BASE_PORT)
        })
    }

    /// Whether the allow-list admits `tool`. An absent allow-list admits all.
    pub fn allows(&self, tool: &str) -> bool {
        self.allowed_tools
            .as_ref()
            .is_none_or(|allowed| allowed.iter().any(|t| t == tool))
    }

    /// Name under which the backend's port is exposed.
    pub fn exposure_name(&self) -> String {
        format!("mcp-server-{}", self.name)
    }

    /// Join an exposed base URL with the backend's MCP path.
    pub fn endpoint_url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        if self.path.starts_with('/') {
            format!("{base}{}", self.path)
        } else {
            format!("{base}/{}", self.path)
        }
    }
}
