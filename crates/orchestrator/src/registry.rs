//! The aggregate tool map handed to the agent loop.

use std::{collections::BTreeMap, sync::Arc};

use {
    mcpbox_mcp::{AgentTool, McpToolWrapper},
    serde_json::Value,
};

use crate::error::{Error, Result};

/// Registered tools keyed by registered name.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<McpToolWrapper>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wrapper under its name, returning the one it replaced.
    pub fn insert(&mut self, wrapper: McpToolWrapper) -> Option<Arc<McpToolWrapper>> {
        self.tools
            .insert(wrapper.name().to_string(), Arc::new(wrapper))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AgentTool>> {
        self.tools
            .get(name)
            .map(|w| Arc::clone(w) as Arc<dyn AgentTool>)
    }

    /// The wrapper registered under `name`, with its owning backend.
    pub fn wrapper(&self, name: &str) -> Option<&Arc<McpToolWrapper>> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tools currently registered for `server`.
    pub fn count_for(&self, server: &str) -> usize {
        self.tools
            .values()
            .filter(|w| w.server_name() == server)
            .count()
    }

    /// Function-calling descriptors, ordered by name.
    pub fn descriptors(&self) -> Vec<Value> {
        self.tools.values().map(|w| w.descriptor()).collect()
    }

    pub async fn call(&self, name: &str, arguments: Value) -> Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| Error::UnknownTool(name.to_string()))?;
        Ok(tool.execute(arguments).await?)
    }

    pub fn clear(&mut self) {
        self.tools.clear();
    }
}
