use std::{sync::Arc, time::Duration};

use {
    mcpbox_config::{BackendConfig, OrchestratorConfig},
    mcpbox_mcp::{ConnectionOptions, ServerConnection, ToolBackend},
};

/// Builds the [`ToolBackend`] for one backend once its URL is known.
pub trait ConnectionFactory: Send + Sync {
    fn build(&self, backend: &BackendConfig, url: &str) -> Arc<dyn ToolBackend>;
}

/// Streamable-HTTP [`ServerConnection`]s.
#[derive(Debug, Clone)]
pub struct McpConnectionFactory {
    pub handshake_timeout: Option<Duration>,
    pub disconnect_timeout: Duration,
}

impl McpConnectionFactory {
    pub fn from_settings(settings: &OrchestratorConfig) -> Self {
        let connect = settings.connect_timeout();
        Self {
            handshake_timeout: (!connect.is_zero()).then_some(connect),
            disconnect_timeout: settings.disconnect_timeout(),
        }
    }
}

impl ConnectionFactory for McpConnectionFactory {
    fn build(&self, backend: &BackendConfig, url: &str) -> Arc<dyn ToolBackend> {
        Arc::new(ServerConnection::http(
            backend.name.clone(),
            url,
            ConnectionOptions {
                handshake_timeout: self.handshake_timeout,
                disconnect_timeout: self.disconnect_timeout,
                headers: backend.headers.clone(),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_idle_http_connection() {
        let factory = McpConnectionFactory::from_settings(&OrchestratorConfig::default());
        assert_eq!(factory.handshake_timeout, Some(Duration::from_secs(60)));

        let backend = factory.build(&BackendConfig::new("alpha", "run"), "http://127.0.0.1:3000/mcp");
        assert_eq!(backend.name(), "alpha");
        assert!(!backend.is_connected());
        assert!(backend.tools().is_empty());
    }

    #[test]
    fn zero_connect_timeout_disables_handshake_limit() {
        let settings = OrchestratorConfig {
            connect_timeout_secs: 0,
            ..Default::default()
        };
        assert!(
            McpConnectionFactory::from_settings(&settings)
                .handshake_timeout
                .is_none()
        );
    }
}
