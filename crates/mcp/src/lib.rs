//! MCP client support for mcpbox.
//!
//! This crate provides:
//! - Streamable HTTP transport and the MCP client session (`http_transport`, `client`)
//! - Per-backend connections owned by a background task (`connection`)
//! - Tool wrappers exposing discovered tools to the agent loop (`tool_bridge`)
//! - In-memory backends for tests and demos (`synthetic`, `record_store`)

pub mod client;
pub mod connection;
pub mod error;
pub mod http_transport;
pub mod record_store;
pub mod synthetic;
pub mod tool_bridge;
pub mod traits;
pub mod types;

pub use {
    client::{HttpSessionFactory, McpClient, McpClientState},
    connection::{ConnectionOptions, ServerConnection, SessionLifecycle},
    error::{Error, McpTransportError, Result},
    http_transport::HttpTransport,
    record_store::RecordStore,
    synthetic::{SyntheticTransport, ToolHandler},
    tool_bridge::{AgentTool, McpToolWrapper, prefixed_name},
    traits::{McpSession, McpTransport, SessionFactory, ToolBackend, ToolMap},
    types::{McpToolDef, NO_RESULT},
};
