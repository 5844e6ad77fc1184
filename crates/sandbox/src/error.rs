use std::time::Duration;

use mcpbox_common::FromMessage;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("command timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("{cli} {action} failed: {stderr}")]
    Cli {
        cli: &'static str,
        action: &'static str,
        stderr: String,
    },
    #[error("sandbox '{0}' did not become ready")]
    NotReady(String),
    #[error("unknown sandbox '{0}'")]
    UnknownSandbox(String),
    #[error("unknown exposure '{0}'")]
    UnknownExposure(String),
    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
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
