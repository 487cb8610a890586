//! Core of mac-apps-mcp
//!
//! Holds the tool registry, the typed tool error, configuration, and the three
//! capability adapters (macOS automation, Ollama, MongoDB).

pub mod config;
pub mod error;
pub mod tools;

pub use config::Config;
pub use error::{ToolError, ToolResult};
pub use tools::{Collaborators, ToolDefinition, ToolExecutor, ToolHandler, ToolRegistry};
