//! Metric name and label definitions.

/// Per-backend MCP session metrics
pub mod mcp {
    /// Connection attempts (handshake + tool listing)
    pub const CONNECTION_ATTEMPTS_TOTAL: &str = "mcpbox_mcp_connection_attempts_total";
    /// Connection attempts that failed before readiness
    pub const CONNECTION_FAILURES_TOTAL: &str = "mcpbox_mcp_connection_failures_total";
    /// Sessions currently alive
    pub const SESSIONS_ALIVE: &str = "mcpbox_mcp_sessions_alive";
    /// Tool calls forwarded to a backend
    pub const TOOL_CALLS_TOTAL: &str = "mcpbox_mcp_tool_calls_total";
    /// Tool calls that returned an error
    pub const TOOL_CALL_ERRORS_TOTAL: &str = "mcpbox_mcp_tool_call_errors_total";
    /// Tool call duration in seconds
    pub const TOOL_CALL_DURATION_SECONDS: &str = "mcpbox_mcp_tool_call_duration_seconds";
}

/// Multi-backend setup and teardown metrics
pub mod orchestrator {
    /// Backends that reached readiness during setup
    pub const BACKENDS_CONNECTED: &str = "mcpbox_orchestrator_backends_connected";
    /// Backends that failed at some setup stage
    pub const BACKEND_FAILURES_TOTAL: &str = "mcpbox_orchestrator_backend_failures_total";
    /// Tools registered in the aggregate map
    pub const TOOLS_REGISTERED: &str = "mcpbox_orchestrator_tools_registered";
    /// Tool names dropped or replaced by the collision policy
    pub const TOOL_COLLISIONS_TOTAL: &str = "mcpbox_orchestrator_tool_collisions_total";
    /// Setup duration in seconds (sandbox creation through aggregation)
    pub const SETUP_DURATION_SECONDS: &str = "mcpbox_orchestrator_setup_duration_seconds";
    /// Teardown steps that failed and were skipped
    pub const TEARDOWN_FAILURES_TOTAL: &str = "mcpbox_orchestrator_teardown_failures_total";
}

/// Sandbox command metrics
pub mod sandbox {
    /// Commands executed inside the sandbox
    pub const COMMAND_EXECUTIONS_TOTAL: &str = "mcpbox_sandbox_command_executions_total";
    /// Commands that errored or exited non-zero
    pub const COMMAND_ERRORS_TOTAL: &str = "mcpbox_sandbox_command_errors_total";
}

/// Common label keys
pub mod labels {
    pub const SERVER: &str = "server";
    pub const TOOL: &str = "tool";
    pub const STAGE: &str = "stage";
    pub const STEP: &str = "step";
    pub const SUCCESS: &str = "success";
    pub const POLICY: &str = "policy";
}
