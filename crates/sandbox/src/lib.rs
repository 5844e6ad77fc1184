//! Sandbox lifecycle capability for mcpbox.
//!
//! The orchestrator only sees the [`Sandbox`] trait: create/wait, run shell
//! commands (foreground or detached), expose a port as a URL, release an
//! exposure, delete. Two implementations ship here:
//! - [`DockerSandbox`]: one long-lived container driven through the `docker` CLI
//! - [`HostSandbox`]: commands run on the host in a scratch directory

pub mod docker;
pub mod error;
pub mod exec;
pub mod host;
pub mod sandbox;

pub use {
    docker::DockerSandbox,
    error::{Error, Result},
    exec::{ExecOpts, ExecResult, exec_command},
    host::HostSandbox,
    sandbox::{ExposedPort, Sandbox, SandboxId, from_config},
};
