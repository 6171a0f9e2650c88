//! Hooks around tool listing and tool calls.
//!
//! - [`ToolAllowlist`] narrows the server to a fixed set of tools; `serve
//!   --read-only` uses it to hide everything that spends credits.
//! - [`AuditLog`] writes one `info!` line when a call starts and one when
//!   it finishes.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::ToolDefinition;
use super::provider::{CallToolResult, ToolError};

/// Longest argument preview the audit log writes, in bytes.
const ARGS_PREVIEW_BYTES: usize = 200;

/// A tool call on its way through the chain.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub name: String,
    pub args: Value,
}

/// A stage in the server's call pipeline. Every hook defaults to a no-op.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn filter_tools(&self, tools: Vec<ToolDefinition>) -> Vec<ToolDefinition> {
        tools
    }

    /// Returning an error stops the call; the error text becomes the
    /// `isError` result.
    async fn before_call(&self, request: ToolCallRequest) -> Result<ToolCallRequest, ToolError> {
        Ok(request)
    }

    async fn after_call(
        &self,
        _request: &ToolCallRequest,
        result: CallToolResult,
    ) -> Result<CallToolResult, ToolError> {
        Ok(result)
    }
}

/// Exposes only the named tools. Others are hidden from `tools/list` and
/// answered as not found.
#[derive(Debug, Clone)]
pub struct ToolAllowlist {
    allowed: HashSet<String>,
}

impl ToolAllowlist {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allows(&self, name: &str) -> bool {
        self.allowed.contains(name)
    }
}

#[async_trait]
impl Middleware for ToolAllowlist {
    async fn filter_tools(&self, mut tools: Vec<ToolDefinition>) -> Vec<ToolDefinition> {
        tools.retain(|t| self.allows(&t.name));
        tools
    }

    async fn before_call(&self, request: ToolCallRequest) -> Result<ToolCallRequest, ToolError> {
        if !self.allows(&request.name) {
            return Err(ToolError::NotFound(request.name));
        }
        Ok(request)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AuditLog;

#[async_trait]
impl Middleware for AuditLog {
    async fn before_call(&self, request: ToolCallRequest) -> Result<ToolCallRequest, ToolError> {
        info!(
            tool = %request.name,
            args = %preview(&request.args, ARGS_PREVIEW_BYTES),
            "tool call started"
        );
        Ok(request)
    }

    async fn after_call(
        &self,
        request: &ToolCallRequest,
        result: CallToolResult,
    ) -> Result<CallToolResult, ToolError> {
        info!(
            tool = %request.name,
            is_error = result.is_error,
            bytes = result.joined_text().len(),
            "tool call completed"
        );
        Ok(result)
    }
}

/// Compact JSON, cut to at most `limit` bytes on a char boundary.
fn preview(value: &Value, limit: usize) -> String {
    let mut text = value.to_string();
    if text.len() > limit {
        let cut = (0..=limit)
            .rev()
            .find(|&i| text.is_char_boundary(i))
            .unwrap_or(0);
        text.truncate(cut);
        text.push_str("...");
    }
    text
}
