use crate::orchestrator::Phase;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no backends configured")]
    MissingBackends,
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    #[error("setup requires phase Idle, orchestrator is {0:?}")]
    InvalidPhase(Phase),
    #[error(transparent)]
    Sandbox(#[from] mcpbox_sandbox::Error),
    #[error(transparent)]
    Tool(#[from] mcpbox_mcp::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
