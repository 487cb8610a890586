//! MCP server implementation
//!
//! Reads JSON-RPC requests one line at a time, dispatches them, and writes
//! newline-delimited responses.

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::protocol::*;

/// MCP server that communicates over line-oriented streams
pub struct McpServer {
    dispatcher: Dispatcher,
}

impl McpServer {
    /// Create a new MCP server wrapping a dispatcher
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Serve requests from `reader` until EOF, writing responses to `writer`
    pub async fn serve<R, W>(&self, mut reader: R, writer: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("MCP server starting");
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }

            let Some(resp) = self.handle_bytes(&buf).await else {
                continue;
            };
            write_response(writer, &resp).await?;
        }

        info!("MCP server input closed");
        Ok(())
    }

    /// Decode one raw line; blank lines are skipped
    async fn handle_bytes(&self, raw: &[u8]) -> Option<JsonRpcResponse> {
        match std::str::from_utf8(raw) {
            Ok(text) => {
                let line = text.trim();
                if line.is_empty() {
                    return None;
                }
                debug!("MCP received: {}", truncate(line));
                self.handle_line(line).await
            }
            Err(e) => {
                warn!("Input line is not valid UTF-8: {}", e);
                Some(JsonRpcResponse::error(
                    Value::Null,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ))
            }
        }
    }

    /// Parse and handle one raw line
    async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                warn!("Invalid JSON-RPC request: {}", e);
                Some(JsonRpcResponse::error(
                    Value::Null,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ))
            }
        }
    }

    /// Handle a single JSON-RPC request
    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        // Notifications (no id) never get responses
        let Some(id) = request.id else {
            if request.method == "notifications/initialized" {
                info!("MCP client initialized");
            } else {
                debug!("MCP notification: {}", request.method);
            }
            return None;
        };

        let response = match request.method.as_str() {
            "initialize" => to_response(id, InitializeResult::current()),

            "notifications/initialized" => {
                info!("MCP client initialized");
                return None;
            }

            "tools/list" => {
                let tools = self.dispatcher.list_tools();
                info!("MCP tools/list: returning {} tools", tools.len());
                JsonRpcResponse::success(id, serde_json::json!({ "tools": tools }))
            }

            "tools/call" => {
                let name = request
                    .params
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                if name.is_empty() {
                    return Some(JsonRpcResponse::error(
                        id,
                        INVALID_PARAMS,
                        "Missing 'name' parameter".to_string(),
                    ));
                }

                let arguments = match request.params.get("arguments") {
                    None | Some(Value::Null) => serde_json::json!({}),
                    Some(args) => args.clone(),
                };

                info!("MCP tools/call: {}", name);
                let result = self.dispatcher.call_tool(name, arguments).await;
                to_response(id, result)
            }

            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),

            method => {
                warn!("MCP unknown method: {}", method);
                JsonRpcResponse::error(
                    id,
                    METHOD_NOT_FOUND,
                    format!("Method not found: {}", method),
                )
            }
        };
        Some(response)
    }
}

fn to_response<T: serde::Serialize>(id: Value, result: T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(
            id,
            INTERNAL_ERROR,
            format!("Internal error: {}", e),
        ),
    }
}

fn truncate(s: &str) -> &str {
    match s.char_indices().nth(200) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

/// Write a JSON-RPC response (newline-delimited)
async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &JsonRpcResponse,
) -> Result<()> {
    let json = serde_json::to_string(response).context("Failed to serialize response")?;
    debug!("MCP sending: {}", truncate(&json));
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
