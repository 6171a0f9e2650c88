//! Model Context Protocol surface.
//!
//! [`server::McpServerShell`] speaks newline-delimited JSON-RPC and routes
//! `tools/call` requests to a single [`provider::ToolProvider`], passing
//! them through a [`middleware::Middleware`] chain on the way.

pub mod middleware;
pub mod provider;
pub mod server;

use serde::{Deserialize, Serialize};

pub use middleware::{AuditLog, Middleware, ToolCallRequest};
pub use provider::{CallToolResult, ContentBlock, ToolError, ToolProvider};
pub use server::McpServerShell;

/// Definition of an MCP tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    #[serde(rename = "inputSchema", alias = "input_schema")]
    pub input_schema: serde_json::Value,
}
