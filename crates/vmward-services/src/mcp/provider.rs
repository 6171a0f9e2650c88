//! The seam between the protocol shell and the code that runs tools.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ToolDefinition;

/// One piece of tool output. Only text is produced here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
}

/// What a `tools/call` answers with.
///
/// `is_error` marks a failed call; the text still carries the details.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallToolResult {
    pub content: Vec<ContentBlock>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

impl CallToolResult {
    fn single(text: String, is_error: bool) -> Self {
        Self {
            content: vec![ContentBlock::Text { text }],
            is_error,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::single(text.into(), false)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::single(text.into(), true)
    }

    /// All text blocks, newline separated.
    pub fn joined_text(&self) -> String {
        let parts: Vec<&str> = self
            .content
            .iter()
            .map(|ContentBlock::Text { text }| text.as_str())
            .collect();
        parts.join("\n")
    }
}

/// Failures a provider reports instead of a result.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

/// A source of tools the server can list and call.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    fn list_tools(&self) -> Vec<ToolDefinition>;

    async fn call_tool(&self, name: &str, args: Value) -> Result<CallToolResult, ToolError>;
}
