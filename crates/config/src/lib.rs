//! Configuration loading, env substitution, and validation for mcpbox.
//!
//! Config files: `mcpbox.toml`, `mcpbox.yaml`, `mcpbox.yml`, or `mcpbox.json`.
//! Searched in `./` then `~/.config/mcpbox/`.
//!
//! `${ENV_VAR}` and `${ENV_VAR:-default}` placeholders are substituted in the
//! raw file text before parsing, so backend secrets can live in the
//! environment instead of the file.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{
        config_dir, find_config_file, load_config, load_config_value, load_explicit_or_discovered,
        parse_config,
    },
    schema::{
        BackendConfig, CollisionPolicy, McpboxConfig, OrchestratorConfig, SandboxBackend,
        SandboxConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate, validate_config},
};
