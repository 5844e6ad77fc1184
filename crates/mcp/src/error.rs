use std::{error::Error as StdError, time::Duration};

use mcpbox_common::FromMessage;

/// Failures of the HTTP/JSON-RPC exchange itself.
#[derive(Debug, thiserror::Error)]
pub enum McpTransportError {
    #[error("MCP server requires authorization (HTTP 401)")]
    Unauthorized { www_authenticate: Option<String> },
    #[error("MCP server returned HTTP {status} for '{method}': {body}")]
    HttpStatus {
        method: String,
        status: u16,
        body: String,
    },
    #[error("JSON-RPC error on '{method}': code={code} message={message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },
    #[error("'{method}' returned no result")]
    EmptyResult { method: String },
    #[error("failed to parse JSON-RPC response from event stream for '{method}'")]
    EventStream { method: String },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    UrlParse(#[from] url::ParseError),
    #[error(transparent)]
    Transport(#[from] McpTransportError),
    /// A call arrived before the session reached readiness, or after it ended.
    #[error("backend '{server}' is not connected")]
    NotConnected { server: String },
    #[error("backend '{server}' already has a live session")]
    AlreadyConnected { server: String },
    #[error("unknown tool '{tool}' on backend '{server}'")]
    UnknownTool { server: String, tool: String },
    #[error("handshake with '{server}' timed out after {}s", .timeout.as_secs_f64())]
    HandshakeTimeout { server: String, timeout: Duration },
    #[error("session for '{server}' ended before replying")]
    SessionClosed { server: String },
    #[error("{message}")]
    Message { message: String },
    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn external<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

mcpbox_common::impl_context!();
