//! Typed failures raised by tool handlers

use thiserror::Error;

/// Failure of a single tool call.
///
/// Handlers raise these internally; the dispatcher turns every variant into an
/// `isError` result, so none of them ever reaches the transport as a fault.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Requested tool name is not in the registry
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Missing, mistyped, or malformed argument
    #[error("{0}")]
    Argument(String),

    /// External process, HTTP, or database call failed
    #[error("{0}")]
    Collaborator(String),

    /// External service could not be reached at all
    #[error("{0}")]
    Connectivity(String),
}

impl ToolError {
    /// Short label used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "unknown_tool",
            Self::Argument(_) => "argument",
            Self::Collaborator(_) => "collaborator",
            Self::Connectivity(_) => "connectivity",
        }
    }
}

pub type ToolResult<T> = std::result::Result<T, ToolError>;
