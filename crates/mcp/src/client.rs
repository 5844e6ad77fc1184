//! MCP client: the protocol handshake and tool calls against one server.

use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    secrecy::Secret,
    serde::de::DeserializeOwned,
    serde_json::Value,
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, McpTransportError, Result},
    http_transport::{DEFAULT_REQUEST_TIMEOUT, HttpTransport},
    traits::{McpSession, McpTransport, SessionFactory},
    types::{
        InitializeParams, InitializeResult, McpToolDef, ToolsCallParams, ToolsCallResult,
        ToolsListResult,
    },
};

/// State of an MCP client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpClientState {
    /// Transport built, handshake not done yet.
    Connected,
    /// `initialize` completed, `initialized` notification sent.
    Ready,
    /// Session closed.
    Closed,
}

/// An MCP client bound to one transport.
pub struct McpClient {
    server_name: String,
    transport: Arc<dyn McpTransport>,
    state: McpClientState,
    server_info: Option<InitializeResult>,
}

impl McpClient {
    pub fn new(server_name: &str, transport: Arc<dyn McpTransport>) -> Self {
        Self {
            server_name: server_name.into(),
            transport,
            state: McpClientState::Connected,
            server_info: None,
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn state(&self) -> McpClientState {
        self.state
    }

    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server_info.as_ref()
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.state != McpClientState::Ready {
            return Err(Error::NotConnected {
                server: self.server_name.clone(),
            });
        }
        Ok(())
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<T> {
        let resp = self.transport.request(method, params).await?;
        let result = resp.result.ok_or_else(|| McpTransportError::EmptyResult {
            method: method.to_string(),
        })?;
        Ok(serde_json::from_value(result)?)
    }
}

#[async_trait]
impl McpSession for McpClient {
    async fn initialize(&mut self) -> Result<InitializeResult> {
        let params = serde_json::to_value(InitializeParams::default())?;
        let result: InitializeResult = match self.call("initialize", Some(params)).await {
            Ok(result) => result,
            Err(e) => {
                warn!(server = %self.server_name, error = %e, "MCP initialize handshake failed");
                return Err(e);
            },
        };

        info!(
            server = %self.server_name,
            protocol = %result.protocol_version,
            server_name = %result.server_info.name,
            "MCP server initialized"
        );

        self.transport
            .notify("notifications/initialized", None)
            .await?;
        self.state = McpClientState::Ready;
        self.server_info = Some(result.clone());
        Ok(result)
    }

    async fn list_tools(&mut self) -> Result<Vec<McpToolDef>> {
        self.ensure_ready()?;

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor
                .take()
                .map(|c| serde_json::json!({ "cursor": c }));
            let page: ToolsListResult = self.call("tools/list", params).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        debug!(server = %self.server_name, count = tools.len(), "fetched MCP tools");
        Ok(tools)
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<ToolsCallResult> {
        self.ensure_ready()?;

        let params = ToolsCallParams {
            name: name.into(),
            arguments,
        };
        self.call("tools/call", Some(serde_json::to_value(&params)?))
            .await
    }

    async fn close(&mut self) {
        if self.state == McpClientState::Closed {
            return;
        }
        self.state = McpClientState::Closed;
        self.transport.kill().await;
        debug!(server = %self.server_name, "MCP session closed");
    }
}

/// Opens [`McpClient`]s over [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpSessionFactory {
    pub request_timeout: Duration,
}

impl Default for HttpSessionFactory {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    async fn open(
        &self,
        server: &str,
        url: &str,
        headers: &HashMap<String, Secret<String>>,
    ) -> Result<Box<dyn McpSession>> {
        info!(server, url, "opening MCP session");
        let transport = HttpTransport::with_headers(url, headers, self.request_timeout)?;
        Ok(Box::new(McpClient::new(server, Arc::new(transport))))
    }
}
