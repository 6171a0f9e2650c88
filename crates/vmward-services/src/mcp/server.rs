//! Line-delimited JSON-RPC front end for the VM tools.
//!
//! [`McpServerShell`] reads one JSON message per line from any
//! `AsyncBufRead` and writes one reply per line to any `AsyncWrite`, so the
//! binary drives it with stdio and tests drive it with byte buffers.
//!
//! Notifications (messages without an `id`) are never answered. Everything
//! except `initialize` is refused until the handshake has happened.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use super::ToolDefinition;
use super::middleware::{Middleware, ToolCallRequest};
use super::provider::{CallToolResult, ToolProvider};

const PROTOCOL_VERSION: &str = "2025-06-18";
const SERVER_NAME: &str = "vmward";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
const INSTRUCTIONS: &str = "Provision and manage VMs on a decentralized compute network. \
    Check the balance before creating VMs and destroy them when finished.";

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const NOT_INITIALIZED: i32 = -32002;

/// Serves one [`ToolProvider`] behind a middleware chain.
pub struct McpServerShell {
    provider: Arc<dyn ToolProvider>,
    middlewares: Vec<Box<dyn Middleware>>,
    initialized: bool,
}

impl McpServerShell {
    pub fn new(provider: Arc<dyn ToolProvider>) -> Self {
        Self {
            provider,
            middlewares: Vec::new(),
            initialized: false,
        }
    }

    /// Append a middleware. Hooks run in insertion order.
    pub fn add_middleware(&mut self, middleware: Box<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    /// Serve until `reader` reaches EOF.
    pub async fn run<R, W>(&mut self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let reply = match serde_json::from_str::<Value>(line) {
                Ok(message) => self.handle(message).await,
                Err(e) => {
                    warn!(error = %e, "unparseable message");
                    Some(failure(Value::Null, PARSE_ERROR, "Parse error"))
                }
            };
            if let Some(reply) = reply {
                send(&mut writer, &reply).await?;
            }
        }
        Ok(())
    }

    /// Answer one message. `None` means nothing goes back on the wire.
    async fn handle(&mut self, message: Value) -> Option<Value> {
        let method = message
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let params = message.get("params").cloned().unwrap_or_else(|| json!({}));
        debug!(method = %method, "mcp message");

        let outcome = match method.as_str() {
            "initialize" => {
                self.initialized = true;
                Ok(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": { "listChanged": false } },
                    "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION },
                    "instructions": INSTRUCTIONS
                }))
            }
            "notifications/initialized" => return None,
            _ if !self.initialized => Err((NOT_INITIALIZED, "Server not initialized".to_owned())),
            "tools/list" => {
                let tools = self.visible_tools().await;
                Ok(json!({ "tools": tools }))
            }
            "tools/call" => {
                let result = self.call(&params).await;
                Ok(serde_json::to_value(result).unwrap_or(Value::Null))
            }
            other => Err((METHOD_NOT_FOUND, format!("Method not found: {other}"))),
        };

        let id = message.get("id")?.clone();
        Some(match outcome {
            Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
            Err((code, text)) => failure(id, code, &text),
        })
    }

    async fn visible_tools(&self) -> Vec<ToolDefinition> {
        let mut tools = self.provider.list_tools();
        for mw in &self.middlewares {
            tools = mw.filter_tools(tools).await;
        }
        tools
    }

    /// Run one `tools/call` through the middleware chain and the provider.
    ///
    /// Every failure becomes an `isError` result, never a protocol error.
    async fn call(&self, params: &Value) -> CallToolResult {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let args = match params.get("arguments") {
            Some(Value::Null) | None => json!({}),
            Some(args) => args.clone(),
        };

        let mut request = ToolCallRequest { name, args };
        for mw in &self.middlewares {
            request = match mw.before_call(request).await {
                Ok(r) => r,
                Err(e) => return CallToolResult::error(e.to_string()),
            };
        }

        let mut result = match self
            .provider
            .call_tool(&request.name, request.args.clone())
            .await
        {
            Ok(result) => result,
            Err(e) => return CallToolResult::error(e.to_string()),
        };
        for mw in &self.middlewares {
            result = match mw.after_call(&request, result).await {
                Ok(r) => r,
                Err(e) => return CallToolResult::error(e.to_string()),
            };
        }
        result
    }
}

fn failure(id: Value, code: i32, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    })
}

async fn send<W: AsyncWrite + Unpin>(writer: &mut W, reply: &Value) -> std::io::Result<()> {
    let mut line = serde_json::to_string(reply).map_err(std::io::Error::other)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
