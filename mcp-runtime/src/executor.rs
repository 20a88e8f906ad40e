use async_trait::async_trait;
use kbeauty_core::tool::{ToolContent, ToolDescriptor};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolExecutionError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    #[error("tool '{tool}' failed: {message}")]
    Failed { tool: String, message: String },
}

impl ToolExecutionError {
    pub fn failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        ToolExecutionError::Failed {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// The collaborator that actually runs tools. The dispatcher never looks inside.
#[async_trait]
pub trait ToolExecutor: Send + Sync + 'static {
    fn list_tools(&self) -> Vec<ToolDescriptor>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<Vec<ToolContent>, ToolExecutionError>;
}
