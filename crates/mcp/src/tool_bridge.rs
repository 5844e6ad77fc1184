//! Adapt discovered MCP tools to the agent-facing [`AgentTool`] interface.

use std::sync::Arc;

use {
    async_trait::async_trait,
    serde_json::{Value, json},
};

use crate::{
    error::{Error, Result},
    traits::ToolBackend,
    types::McpToolDef,
};

/// Separator used when registered names carry their backend name.
pub const PREFIX_SEPARATOR: &str = "__";

/// `<backend>__<tool>`.
pub fn prefixed_name(server: &str, tool: &str) -> String {
    format!("{server}{PREFIX_SEPARATOR}{tool}")
}

/// A tool the agent loop can describe and invoke.
#[async_trait]
pub trait AgentTool: Send + Sync {
    /// Name the tool is registered under.
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    async fn execute(&self, params: Value) -> Result<String>;

    /// Function-calling descriptor handed to the model.
    fn descriptor(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description(),
                "parameters": self.parameters_schema(),
            }
        })
    }
}

/// Binds one discovered tool to the backend that owns it.
pub struct McpToolWrapper {
    registered_name: String,
    original_name: String,
    description: String,
    input_schema: Value,
    backend: Arc<dyn ToolBackend>,
}

impl McpToolWrapper {
    pub fn new(backend: Arc<dyn ToolBackend>, tool: &McpToolDef) -> Self {
        let input_schema = match &tool.input_schema {
            Value::Null => json!({ "type": "object", "properties": {} }),
            schema => schema.clone(),
        };
        Self {
            registered_name: tool.name.clone(),
            original_name: tool.name.clone(),
            description: tool.description.clone().unwrap_or_default(),
            input_schema,
            backend,
        }
    }

    /// Register under `<backend>__<tool>` instead of the bare tool name.
    #[must_use]
    pub fn prefixed(mut self) -> Self {
        self.registered_name = prefixed_name(self.backend.name(), &self.original_name);
        self
    }

    /// Create wrappers for every tool of a backend.
    pub fn from_backend(backend: &Arc<dyn ToolBackend>, tools: &[McpToolDef]) -> Vec<Self> {
        tools
            .iter()
            .map(|t| Self::new(Arc::clone(backend), t))
            .collect()
    }

    /// Tool name on the backend.
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn server_name(&self) -> &str {
        self.backend.name()
    }
}

impl std::fmt::Debug for McpToolWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpToolWrapper")
            .field("registered_name", &self.registered_name)
            .field("server", &self.backend.name())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AgentTool for McpToolWrapper {
    fn name(&self) -> &str {
        &self.registered_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.input_schema.clone()
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let arguments = match params {
            Value::Null => json!({}),
            Value::Object(_) => params,
            other => {
                return Err(Error::message(format!(
                    "arguments for '{}' must be a JSON object, got {other}",
                    self.registered_name
                )));
            },
        };
        self.backend.call_tool(&self.original_name, arguments).await
    }
}
