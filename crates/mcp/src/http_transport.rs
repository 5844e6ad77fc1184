//! Streamable HTTP transport for MCP servers.
//!
//! Every JSON-RPC message is an HTTP POST; the server answers with either a
//! JSON body or a short `text/event-stream` carrying the response. The
//! `Mcp-Session-Id` header handed out by the server is echoed on every later
//! request and the session is closed with a DELETE.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use {
    reqwest::{Client, RequestBuilder, Response, StatusCode, header},
    secrecy::{ExposeSecret, Secret},
    serde_json::Value,
    tokio::sync::RwLock,
    tracing::{debug, warn},
};

use crate::{
    error::{Context, Error, McpTransportError, Result},
    traits::McpTransport,
    types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION},
};

const MCP_PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";
const MCP_SESSION_ID_HEADER: &str = "Mcp-Session-Id";
const STREAMABLE_ACCEPT_HEADER: &str = "application/json, text/event-stream";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP transport for one remote MCP endpoint.
pub struct HttpTransport {
    client: Client,
    url: String,
    next_id: AtomicU64,
    /// Extra headers sent on every request (API keys and the like).
    headers: Vec<(String, Secret<String>)>,
    session_id: RwLock<Option<String>>,
}

impl HttpTransport {
    pub fn new(url: &str) -> Result<Self> {
        Self::with_headers(url, &HashMap::new(), DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_headers(
        url: &str,
        headers: &HashMap<String, Secret<String>>,
        timeout: Duration,
    ) -> Result<Self> {
        url::Url::parse(url)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::external("failed to build HTTP client", e))?;

        let mut headers: Vec<_> = headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(Self {
            client,
            url: url.to_string(),
            next_id: AtomicU64::new(1),
            headers,
            session_id: RwLock::new(None),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Attach protocol, session and custom headers.
    async fn decorate(&self, mut req: RequestBuilder) -> RequestBuilder {
        req = req.header(MCP_PROTOCOL_VERSION_HEADER, PROTOCOL_VERSION);
        if let Some(session_id) = self.session_id.read().await.clone() {
            req = req.header(MCP_SESSION_ID_HEADER, session_id);
        }
        for (name, value) in &self.headers {
            req = req.header(name.as_str(), value.expose_secret().as_str());
        }
        req
    }

    async fn post(&self, method: &str, body: &impl serde::Serialize) -> Result<Response> {
        let req = self
            .client
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, STREAMABLE_ACCEPT_HEADER);
        let resp = self
            .decorate(req)
            .await
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST to '{}' for '{method}' failed", self.url))?;

        self.store_session_id(&resp).await;

        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(McpTransportError::Unauthorized {
                www_authenticate: resp
                    .headers()
                    .get(header::WWW_AUTHENTICATE)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from),
            }
            .into());
        }
        Ok(resp)
    }

    async fn store_session_id(&self, response: &Response) {
        let Some(session_id) = response
            .headers()
            .get(MCP_SESSION_ID_HEADER)
            .and_then(|raw| raw.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
        else {
            return;
        };

        let mut slot = self.session_id.write().await;
        if slot.as_deref() != Some(session_id) {
            debug!(url = %self.url, session_id, "updated MCP session id");
            *slot = Some(session_id.to_string());
        }
    }

    fn is_event_stream(resp: &Response) -> bool {
        resp.headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|base| base.trim() == "text/event-stream")
    }

    /// Pull the first JSON-RPC response out of an event-stream body.
    fn parse_event_stream(body: &str, method: &str) -> Result<JsonRpcResponse> {
        let mut data = String::new();

        for line in body.lines() {
            let line = line.trim_end();
            if let Some(rest) = line.strip_prefix("data:") {
                if !data.is_empty() {
                    data.push('\n');
                }
                data.push_str(rest.trim_start());
                continue;
            }
            if line.is_empty() && !data.is_empty() {
                if let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(&data) {
                    return Ok(resp);
                }
                data.clear();
            }
        }

        if !data.is_empty()
            && let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(&data)
        {
            return Ok(resp);
        }

        Err(McpTransportError::EventStream {
            method: method.to_string(),
        }
        .into())
    }
}

#[async_trait::async_trait]
impl McpTransport for HttpTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req = JsonRpcRequest::new(id, method, params);

        debug!(method, id, url = %self.url, "client -> server");

        let http_resp = self.post(method, &req).await?;

        let status = http_resp.status();
        if !status.is_success() {
            let body = http_resp.text().await.unwrap_or_default();
            return Err(McpTransportError::HttpStatus {
                method: method.to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let mut resp: JsonRpcResponse = if Self::is_event_stream(&http_resp) {
            let body = http_resp
                .text()
                .await
                .with_context(|| format!("failed to read event stream for '{method}'"))?;
            Self::parse_event_stream(&body, method)?
        } else {
            http_resp
                .json()
                .await
                .with_context(|| format!("failed to parse JSON-RPC response for '{method}'"))?
        };

        if let Some(err) = resp.error.take() {
            return Err(McpTransportError::Rpc {
                method: method.to_string(),
                code: err.code,
                message: err.message,
            }
            .into());
        }

        Ok(resp)
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let notif = JsonRpcNotification::new(method, params);

        debug!(method, url = %self.url, "client -> server (notification)");

        let http_resp = self.post(method, &notif).await?;
        if !http_resp.status().is_success() {
            warn!(method, status = %http_resp.status(), "notification returned non-success");
        }
        Ok(())
    }

    async fn is_alive(&self) -> bool {
        let req = self
            .client
            .get(&self.url)
            .timeout(Duration::from_secs(5))
            .header(header::ACCEPT, STREAMABLE_ACCEPT_HEADER);

        match self.decorate(req).await.send().await {
            Ok(resp) => {
                self.store_session_id(&resp).await;
                true
            },
            Err(_) => false,
        }
    }

    async fn kill(&self) {
        let Some(session_id) = self.session_id.write().await.take() else {
            return;
        };

        let mut req = self
            .client
            .delete(&self.url)
            .timeout(Duration::from_secs(5))
            .header(MCP_PROTOCOL_VERSION_HEADER, PROTOCOL_VERSION)
            .header(MCP_SESSION_ID_HEADER, session_id);
        for (name, value) in &self.headers {
            req = req.header(name.as_str(), value.expose_secret().as_str());
        }

        if let Err(e) = req.send().await {
            warn!(url = %self.url, error = %e, "failed to close MCP session");
        }
    }
}
