//! Multi-backend orchestration for mcpbox.
//!
//! One sandbox hosts N MCP backends. The orchestrator creates it, exposes
//! every backend port, provisions and starts each backend, connects to all
//! of them concurrently and merges their tools into a single
//! [`ToolRegistry`]. A backend that fails at any stage is reported and
//! skipped; teardown releases whatever was acquired, exactly once.

pub mod aggregate;
pub mod error;
pub mod factory;
pub mod orchestrator;
pub mod registry;

pub use {
    aggregate::{BackendOutcome, BackendReport, Collision, SetupReport, SetupStage},
    error::{Error, Result},
    factory::{ConnectionFactory, McpConnectionFactory},
    mcpbox_config::CollisionPolicy,
    orchestrator::{MultiServerOrchestrator, Phase},
    registry::ToolRegistry,
};
