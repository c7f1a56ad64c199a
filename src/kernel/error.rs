use super::interruption::InterruptionId;

/// The classifier failed or broke its contract.
#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error("unknown interruption label: {0:?}")]
    UnknownLabel(String),
    #[error("classifier transport failed: {0}")]
    Transport(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("interruption {0} has no classified type")]
    UnknownInterruptionType(InterruptionId),
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("no tool executor configured")]
    NotConfigured,
    #[error("tool call cancelled")]
    Cancelled,
    #[error("tool execution failed: {0}")]
    Execution(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("speech sink I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("speech sink rejected text: {0}")]
    Rejected(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Classification(#[from] ClassificationError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

#[derive(Debug, thiserror::Error)]
pub enum ReactorError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Tool(#[from] ToolError),
}
