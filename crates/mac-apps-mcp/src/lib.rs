//! MCP (Model Context Protocol) server for mac-apps-mcp
//!
//! Exposes the core tool registry to MCP clients over newline-delimited
//! JSON-RPC 2.0.

pub mod dispatcher;
pub mod protocol;
pub mod server;

pub use dispatcher::Dispatcher;
pub use server::McpServer;
