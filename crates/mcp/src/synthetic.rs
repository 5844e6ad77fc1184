//! In-memory [`ToolBackend`] that routes calls to Rust handlers over shared
//! JSON data. No network, no sandbox.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use {
    async_trait::async_trait,
    serde_json::Value,
    tracing::{debug, info},
};

use crate::{
    error::{Error, Result},
    traits::{ToolBackend, ToolMap},
    types::McpToolDef,
};

/// Handler for one synthetic tool: `(data, arguments) -> text`.
pub type ToolHandler = Arc<dyn Fn(&mut Value, &Value) -> Result<String> + Send + Sync>;

pub struct SyntheticTransport {
    name: String,
    tools: ToolMap,
    handlers: HashMap<String, ToolHandler>,
    data: Arc<Mutex<Value>>,
    connected: AtomicBool,
    handshake_error: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl SyntheticTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools: ToolMap::new(),
            handlers: HashMap::new(),
            data: Arc::new(Mutex::new(Value::Object(Default::default()))),
            connected: AtomicBool::new(false),
            handshake_error: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Add a tool together with its handler.
    #[must_use]
    pub fn with_tool<F>(mut self, tool: McpToolDef, handler: F) -> Self
    where
        F: Fn(&mut Value, &Value) -> Result<String> + Send + Sync + 'static,
    {
        self.handlers.insert(tool.name.clone(), Arc::new(handler));
        self.tools.insert(tool.name.clone(), tool);
        self
    }

    /// Advertise a tool without a handler; calling it fails.
    #[must_use]
    pub fn with_unhandled_tool(mut self, tool: McpToolDef) -> Self {
        self.tools.insert(tool.name.clone(), tool);
        self
    }

    /// Replace the shared data the handlers operate on.
    #[must_use]
    pub fn with_data(self, data: Value) -> Self {
        *self.lock_data() = data;
        self
    }

    /// Make every `connect()` fail with `message`.
    #[must_use]
    pub fn failing_handshake(mut self, message: impl Into<String>) -> Self {
        self.handshake_error = Some(message.into());
        self
    }

    /// Snapshot of the shared data.
    pub fn data(&self) -> Value {
        self.lock_data().clone()
    }

    /// Names of the tools invoked so far, in call order.
    pub fn call_log(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_data(&self) -> MutexGuard<'_, Value> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ToolBackend for SyntheticTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn tools(&self) -> ToolMap {
        if self.is_connected() {
            self.tools.clone()
        } else {
            ToolMap::new()
        }
    }

    async fn connect(&self) -> Result<ToolMap> {
        if let Some(message) = &self.handshake_error {
            return Err(Error::message(format!(
                "handshake with '{}' failed: {message}",
                self.name
            )));
        }
        if self.connected.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyConnected {
                server: self.name.clone(),
            });
        }
        info!(server = %self.name, tools = self.tools.len(), "synthetic backend connected");
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String> {
        if !self.is_connected() {
            return Err(Error::NotConnected {
                server: self.name.clone(),
            });
        }
        if !self.tools.contains_key(name) {
            return Err(Error::UnknownTool {
                server: self.name.clone(),
                tool: name.to_string(),
            });
        }
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| Error::message(format!("no handler for tool '{name}'")))?;

        debug!(server = %self.name, tool = name, "synthetic tool call");
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.to_string());
        handler(&mut self.lock_data(), &arguments)
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn counter_backend() -> SyntheticTransport {
        SyntheticTransport::new("counter")
            .with_data(json!({"count": 0}))
            .with_tool(
                McpToolDef::new("bump", "Increment the counter", json!({"type": "object"})),
                |data, args| {
                    let by = args["by"].as_i64().unwrap_or(1);
                    let next = data["count"].as_i64().unwrap_or(0) + by;
                    data["count"] = json!(next);
                    Ok(next.to_string())
                },
            )
            .with_unhandled_tool(McpToolDef::new("orphan", "No handler", Value::Null))
    }

    #[tokio::test]
    async fn handlers_mutate_shared_data() {
        let backend = counter_backend();
        backend.connect().await.unwrap();
        assert_eq!(backend.call_tool("bump", json!({})).await.unwrap(), "1");
        assert_eq!(backend.call_tool("bump", json!({"by": 5})).await.unwrap(), "6");
        assert_eq!(backend.data()["count"], 6);
        assert_eq!(backend.call_log(), vec!["bump", "bump"]);
    }

    #[tokio::test]
    async fn calls_while_disconnected_fail() {
        let backend = counter_backend();
        let err = backend.call_tool("bump", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected { .. }));
        assert!(backend.tools().is_empty());

        backend.connect().await.unwrap();
        backend.disconnect().await;
        assert!(backend.call_tool("bump", json!({})).await.is_err());
    }

    #[tokio::test]
    async fn missing_handler_and_unknown_tool_error() {
        let backend = counter_backend();
        backend.connect().await.unwrap();
        let err = backend.call_tool("orphan", json!({})).await.unwrap_err();
        assert!(err.to_string().contains("no handler"));
        let err = backend.call_tool("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::UnknownTool { .. }));
        assert!(backend.call_log().is_empty());
    }

    #[tokio::test]
    async fn failing_handshake_never_connects() {
        let backend = counter_backend().failing_handshake("network unreachable");
        let err = backend.connect().await.unwrap_err();
        assert!(err.to_string().contains("network unreachable"));
        assert!(!backend.is_connected());
        backend.disconnect().await;
    }
}
