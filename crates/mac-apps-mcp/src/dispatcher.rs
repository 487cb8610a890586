//! Dispatcher between the tool registry and the MCP envelope
//!
//! Every outcome of a tool call, including unknown tool names, becomes a
//! normal `tools/call` result. Callers tell failures apart by `isError`,
//! never by a JSON-RPC error.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use mac_apps_core::tools::{ToolExecutor, ToolRegistry};
use mac_apps_core::ToolResult;

use crate::protocol::{McpTool, ToolCallResult, ToolContent};

/// Routes tool calls by name and normalizes their outcome
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// All tools as MCP tool definitions, in registration order
    pub fn list_tools(&self) -> Vec<McpTool> {
        self.registry
            .list_tools()
            .into_iter()
            .map(|t| McpTool {
                name: t.name,
                description: t.description,
                input_schema: t.input_schema,
            })
            .collect()
    }

    /// Execute a tool and return the MCP-formatted result
    pub async fn call_tool(&self, name: &str, arguments: Value) -> ToolCallResult {
        debug!("Dispatching tool: {}", name);
        let outcome = self.registry.execute(name, arguments).await;
        if outcome.is_ok() {
            info!("Tool {} completed", name);
        }
        into_envelope(outcome)
    }
}

/// The single point where tool failures are turned into result envelopes
pub fn into_envelope(outcome: ToolResult<String>) -> ToolCallResult {
    match outcome {
        Ok(text) => ToolCallResult {
            content: vec![ToolContent::text(text)],
            is_error: false,
        },
        Err(e) => ToolCallResult {
            content: vec![ToolContent::text(format!("Error: {}", e))],
            is_error: true,
        },
    }
}
