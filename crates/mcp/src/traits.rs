//! Trait seams between the wire transport, the protocol session, and the
//! per-backend connection the orchestrator talks to.
//!
//! Layering, bottom up:
//! - [`McpTransport`] moves JSON-RPC messages (`HttpTransport`).
//! - [`McpSession`] speaks MCP over a transport (`McpClient`). A session is
//!   owned by exactly one task, so it only needs `Send`.
//! - [`ToolBackend`] is what wrappers and the orchestrator hold: a shareable
//!   handle that marshals calls onto the session owner (`ServerConnection`),
//!   or an in-memory stand-in (`SyntheticTransport`).

use std::collections::{BTreeMap, HashMap};

use {async_trait::async_trait, secrecy::Secret, serde_json::Value};

use crate::{
    error::Result,
    types::{InitializeResult, JsonRpcResponse, McpToolDef, ToolsCallResult},
};

/// Discovered tools of one backend, keyed by tool name.
pub type ToolMap = BTreeMap<String, McpToolDef>;

/// Transport layer for MCP communication (JSON-RPC).
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a JSON-RPC request and wait for the response.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse>;

    /// Send a JSON-RPC notification (no response expected).
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()>;

    /// Check if the underlying connection is still reachable.
    async fn is_alive(&self) -> bool;

    /// Close the underlying connection.
    async fn kill(&self);
}

/// One protocol session with one server.
#[async_trait]
pub trait McpSession: Send {
    /// Perform the `initialize` / `notifications/initialized` handshake.
    async fn initialize(&mut self) -> Result<InitializeResult>;

    /// Fetch the full tool catalog.
    async fn list_tools(&mut self) -> Result<Vec<McpToolDef>>;

    /// Invoke a tool and return the raw result.
    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<ToolsCallResult>;

    /// Release the session. Never fails.
    async fn close(&mut self);
}

/// Opens sessions for a server URL.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(
        &self,
        server: &str,
        url: &str,
        headers: &HashMap<String, Secret<String>>,
    ) -> Result<Box<dyn McpSession>>;
}

/// A backend as seen by tool wrappers and the orchestrator.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// Backend name from configuration.
    fn name(&self) -> &str;

    /// Snapshot of the discovered tools; empty until connected.
    fn tools(&self) -> ToolMap;

    /// Handshake and discover tools.
    async fn connect(&self) -> Result<ToolMap>;

    /// Call a discovered tool and flatten its result to text.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String>;

    /// Stop the session. Safe on a backend that never connected or already
    /// stopped.
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;
}
