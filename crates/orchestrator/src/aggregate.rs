//! Per-backend outcomes and merging of filtered tool sets.

use std::sync::Arc;

#[cfg(feature = "metrics")]
use mcpbox_metrics::{counter, labels, orchestrator as orch_metrics};
use {
    mcpbox_config::{BackendConfig, CollisionPolicy},
    mcpbox_mcp::{AgentTool, McpToolWrapper, ToolBackend, ToolMap},
    serde::Serialize,
    tracing::{debug, info, warn},
};

use crate::registry::ToolRegistry;

/// Setup step at which a backend dropped out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupStage {
    Expose,
    Provision,
    Start,
    Connect,
}

impl SetupStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expose => "expose",
            Self::Provision => "provision",
            Self::Start => "start",
            Self::Connect => "connect",
        }
    }
}

impl std::fmt::Display for SetupStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackendOutcome {
    Connected {
        /// Tools the backend advertised.
        discovered: usize,
        /// Tools that made it into the aggregate map.
        registered: usize,
    },
    Failed {
        stage: SetupStage,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendReport {
    pub name: String,
    #[serde(flatten)]
    pub outcome: BackendOutcome,
}

/// A registered name claimed by more than one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collision {
    pub tool: String,
    /// Backend whose tool is registered under the name.
    pub kept: String,
    /// Backend whose tool was dropped or replaced.
    pub dropped: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SetupReport {
    /// One entry per configured backend, in configuration order.
    pub backends: Vec<BackendReport>,
    pub collisions: Vec<Collision>,
}

impl SetupReport {
    pub fn outcome(&self, backend: &str) -> Option<&BackendOutcome> {
        self.backends
            .iter()
            .find(|b| b.name == backend)
            .map(|b| &b.outcome)
    }

    pub fn connected_count(&self) -> usize {
        self.backends
            .iter()
            .filter(|b| matches!(b.outcome, BackendOutcome::Connected { .. }))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &BackendReport> {
        self.backends
            .iter()
            .filter(|b| matches!(b.outcome, BackendOutcome::Failed { .. }))
    }
}

/// A backend that reached readiness, with what it advertised.
pub(crate) struct Discovered<'a> {
    pub config: &'a BackendConfig,
    pub backend: Arc<dyn ToolBackend>,
    pub tools: ToolMap,
}

/// Filter each backend's tools through its allow-list and merge them in
/// order, resolving duplicate names with `policy`.
pub(crate) fn aggregate(
    discovered: &[Discovered<'_>],
    policy: CollisionPolicy,
) -> (ToolRegistry, Vec<Collision>) {
    let mut registry = ToolRegistry::new();
    let mut collisions = Vec::new();

    for entry in discovered {
        let server = entry.config.name.as_str();

        if let Some(allowed) = &entry.config.allowed_tools {
            for missing in allowed.iter().filter(|t| !entry.tools.contains_key(*t)) {
                warn!(server, tool = %missing, "allow-listed tool not offered by backend");
            }
        }

        for tool in entry.tools.values() {
            if !entry.config.allows(&tool.name) {
                debug!(server, tool = %tool.name, "tool filtered by allow-list");
                continue;
            }

            let mut wrapper = McpToolWrapper::new(Arc::clone(&entry.backend), tool);
            if policy == CollisionPolicy::Prefix {
                wrapper = wrapper.prefixed();
            }
            let name = wrapper.name().to_string();

            let existing = registry
                .wrapper(&name)
                .map(|w| w.server_name().to_string());
            match (existing, policy) {
                (None, _) => {
                    registry.insert(wrapper);
                },
                (Some(previous), CollisionPolicy::LastWins) => {
                    warn!(tool = %name, kept = server, replaced = %previous, "tool name collision, later backend wins");
                    registry.insert(wrapper);
                    collisions.push(Collision {
                        tool: name,
                        kept: server.to_string(),
                        dropped: previous,
                    });
                    record_collision(policy);
                },
                (Some(previous), _) => {
                    warn!(tool = %name, kept = %previous, rejected = server, "tool name collision, duplicate rejected");
                    collisions.push(Collision {
                        tool: name,
                        kept: previous,
                        dropped: server.to_string(),
                    });
                    record_collision(policy);
                },
            }
        }
    }

    info!(
        tools = registry.len(),
        collisions = collisions.len(),
        policy = %policy,
        "aggregated tool map"
    );
    (registry, collisions)
}

fn record_collision(policy: CollisionPolicy) {
    #[cfg(feature = "metrics")]
    counter!(orch_metrics::TOOL_COLLISIONS_TOTAL, labels::POLICY => policy.to_string())
        .increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = policy;
}
