use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;

use super::error::ToolError;

/// Tool advertised to the classifier and the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// A concrete tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// A tool request is either free text for the executor to resolve, or an
/// already resolved call. Never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolRequest {
    Prompt(String),
    Call(ToolCall),
}

impl fmt::Display for ToolRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolRequest::Prompt(prompt) => f.write_str(prompt),
            ToolRequest::Call(call) => write!(f, "{}({})", call.name, call.arguments),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    /// The call actually performed (resolved from the prompt if needed).
    pub call: ToolCall,
    pub output: String,
}

/// External tool execution.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        cancel: &CancellationToken,
        request: &ToolRequest,
    ) -> Result<ToolOutcome, ToolError>;
}
