use std::sync::Arc;

use {
    async_trait::async_trait,
    mcpbox_config::{SandboxBackend, SandboxConfig},
};

use crate::{
    docker::DockerSandbox,
    error::Result,
    exec::{ExecOpts, ExecResult},
    host::HostSandbox,
};

/// Identifier of one created sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SandboxId {
    pub key: String,
}

impl SandboxId {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl std::fmt::Display for SandboxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}

/// A port made reachable from outside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposedPort {
    /// Handle passed back to [`Sandbox::unexpose`].
    pub exposure_id: String,
    /// Routable base URL, without the MCP path.
    pub url: String,
    pub port: u16,
    pub name: String,
}

/// Lifecycle capability for the sandbox hosting the backends.
///
/// All backends share one sandbox: one filesystem and one process table.
/// Implementations do not serialize commands; callers order them.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Human-readable backend name (e.g. "docker", "host").
    fn backend_name(&self) -> &'static str;

    /// Create a sandbox. `name` is a prefix; the returned id is unique.
    async fn create(&self, name: &str) -> Result<SandboxId>;

    /// Block until the sandbox accepts commands.
    async fn wait_for_creation(&self, id: &SandboxId) -> Result<()>;

    /// Run a command to completion inside the sandbox.
    async fn exec(&self, id: &SandboxId, command: &str, opts: &ExecOpts) -> Result<ExecResult>;

    /// Launch a long-running command and return once it has been started.
    /// `opts.timeout` bounds the launch, not the process.
    async fn spawn_detached(&self, id: &SandboxId, command: &str, opts: &ExecOpts) -> Result<()>;

    /// Make `port` reachable and return its URL.
    async fn expose(&self, id: &SandboxId, port: u16, name: &str) -> Result<ExposedPort>;

    /// Release an exposure created by [`Sandbox::expose`].
    async fn unexpose(&self, id: &SandboxId, exposure_id: &str) -> Result<()>;

    /// Destroy the sandbox and everything running in it.
    async fn delete(&self, id: &SandboxId) -> Result<()>;
}

/// Build the sandbox implementation selected in config.
pub fn from_config(config: &SandboxConfig) -> Arc<dyn Sandbox> {
    match config.backend {
        SandboxBackend::Docker => Arc::new(DockerSandbox::new(config.clone())),
        SandboxBackend::Host => Arc::new(HostSandbox::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_selects_backend() {
        let mut config = SandboxConfig::default();
        assert_eq!(from_config(&config).backend_name(), "docker");
        config.backend = SandboxBackend::Host;
        assert_eq!(from_config(&config).backend_name(), "host");
    }

    #[test]
    fn sandbox_id_display_is_key() {
        assert_eq!(SandboxId::new("sbx-1").to_string(), "sbx-1");
    }
}
