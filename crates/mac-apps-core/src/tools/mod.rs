//! Tool registry and executor system

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{ToolError, ToolResult};

pub mod macos;
pub mod mongo;
pub mod ollama;
#[cfg(test)]
pub(crate) mod testing;

use self::macos::{CommandRunner, SystemCommandRunner};
use self::mongo::{DocumentStore, MongoStore};
use self::ollama::OllamaClient;

/// Tool descriptor as advertised to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Trait for executing tools
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool_name: &str, input: Value) -> ToolResult<String>;
    fn list_tools(&self) -> Vec<ToolDefinition>;
}

/// Individual tool handler
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    async fn execute(&self, input: Value) -> ToolResult<String>;
}

/// Registry of available tools, kept in registration order
pub struct ToolRegistry {
    tools: Vec<Arc<dyn ToolHandler>>,
    index: HashMap<Arc<str>, usize>,
}

impl ToolRegistry {
    /// Create a new empty tool registry
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool handler. Names must be unique.
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) -> Result<()> {
        let name: Arc<str> = Arc::from(handler.name());
        if self.index.contains_key(&name) {
            bail!("Tool '{}' is already registered", name);
        }
        debug!("Registering tool: {}", name);
        self.index.insert(name, self.tools.len());
        self.tools.push(handler);
        Ok(())
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    /// Tool names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(&self, tool_name: &str, input: Value) -> ToolResult<String> {
        debug!("Executing tool: {} with input: {:?}", tool_name, input);

        let handler = self
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;

        match handler.execute(input).await {
            Ok(result) => {
                debug!("Tool {} succeeded", tool_name);
                Ok(result)
            }
            Err(e) => {
                warn!("Tool {} failed ({}): {}", tool_name, e.kind(), e);
                Err(e)
            }
        }
    }

    fn list_tools(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|handler| ToolDefinition {
                name: handler.name().to_string(),
                description: handler.description().to_string(),
                input_schema: handler.input_schema(),
            })
            .collect()
    }
}

/// External systems the built-in tools talk to
#[derive(Clone)]
pub struct Collaborators {
    pub commands: Arc<dyn CommandRunner>,
    pub ollama: Arc<OllamaClient>,
    pub documents: Arc<dyn DocumentStore>,
}

impl Collaborators {
    /// Real collaborators: spawned processes, the Ollama HTTP API, MongoDB
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            commands: Arc::new(SystemCommandRunner::new(Duration::from_secs(
                config.command_timeout_secs,
            ))),
            ollama: Arc::new(OllamaClient::new(&config.ollama_api_url)?),
            documents: Arc::new(MongoStore::new(&config.mongodb_uri)),
        })
    }
}

/// Build the registry with every built-in tool, in catalog order
pub fn builtin_registry(collaborators: &Collaborators) -> Result<ToolRegistry> {
    let commands = &collaborators.commands;
    let model_api = &collaborators.ollama;
    let store = &collaborators.documents;

    let handlers: Vec<Arc<dyn ToolHandler>> = vec![
        // ── macOS automation ──
        Arc::new(macos::OpenApplicationTool::new(commands.clone())),
        Arc::new(macos::GetRunningApplicationsTool::new(commands.clone())),
        Arc::new(macos::RunAppleScriptTool::new(commands.clone())),
        Arc::new(macos::QuitApplicationTool::new(commands.clone())),
        Arc::new(macos::OpenFileWithAppTool::new(commands.clone())),
        Arc::new(macos::SearchGoogleInSafariTool::new(commands.clone())),
        // ── Ollama ──
        Arc::new(ollama::OllamaGenerateTool::new(model_api.clone())),
        Arc::new(ollama::OllamaListModelsTool::new(model_api.clone())),
        // ── MongoDB ──
        Arc::new(mongo::CreateDatabaseTool::new(store.clone())),
        Arc::new(mongo::ListDatabasesTool::new(store.clone())),
        Arc::new(mongo::CreateCollectionTool::new(store.clone())),
        Arc::new(mongo::ListCollectionsTool::new(store.clone())),
        Arc::new(mongo::DeleteCollectionTool::new(store.clone())),
        Arc::new(mongo::InsertDocumentTool::new(store.clone())),
        Arc::new(mongo::FindDocumentsTool::new(store.clone())),
        Arc::new(mongo::DeleteDocumentTool::new(store.clone())),
    ];

    let mut registry = ToolRegistry::new();
    for handler in handlers {
        registry.register(handler)?;
    }
    Ok(registry)
}

/// Helper function to create a JSON schema for tool input
pub fn json_schema(properties: Value, required: Vec<&str>) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Extract a required string argument
pub(crate) fn required_str<'a>(input: &'a Value, key: &str) -> ToolResult<&'a str> {
    input
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::Argument(format!("Missing required argument '{}'", key)))
}

/// Extract an optional string argument. JSON null counts as absent.
pub(crate) fn optional_str<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input.get(key).and_then(|v| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{MemoryStore, MockCommandRunner, unreachable_ollama};
    use std::collections::HashSet;

    struct DummyTool;

    #[async_trait]
    impl ToolHandler for DummyTool {
        fn name(&self) -> &str {
            "dummy"
        }

        fn description(&self) -> &str {
            "A dummy tool for testing"
        }

        fn input_schema(&self) -> Value {
            json_schema(
                serde_json::json!({
                    "message": {
                        "type": "string",
                        "description": "Test message"
                    }
                }),
                vec!["message"],
            )
        }

        async fn execute(&self, input: Value) -> ToolResult<String> {
            let message = required_str(&input, "message")?;
            Ok(format!("dummy: {}", message))
        }
    }

    fn mock_collaborators() -> Collaborators {
        Collaborators {
            commands: Arc::new(MockCommandRunner::new()),
            ollama: Arc::new(unreachable_ollama()),
            documents: Arc::new(MemoryStore::new()),
        }
    }

    #[tokio::test]
    async fn test_tool_registry() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(DummyTool)).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.get("dummy").is_some());
        assert!(registry.get("missing").is_none());

        let result = registry
            .execute("dummy", serde_json::json!({"message": "hi"}))
            .await
            .unwrap();
        assert_eq!(result, "dummy: hi");
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(DummyTool)).unwrap();
        let err = registry.register(Arc::new(DummyTool)).unwrap_err();
        assert!(err.to_string().contains("already registered"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("__nonexistent__", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(ref name) if name == "__nonexistent__"));
    }

    #[tokio::test]
    async fn test_missing_argument() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(DummyTool)).unwrap();
        let err = registry
            .execute("dummy", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Argument(_)));
        assert_eq!(err.to_string(), "Missing required argument 'message'");
    }

    #[test]
    fn test_builtin_catalog_order() {
        let registry = builtin_registry(&mock_collaborators()).unwrap();
        assert_eq!(
            registry.names(),
            vec![
                "open_application",
                "get_running_applications",
                "run_applescript",
                "quit_application",
                "open_file_with_app",
                "search_google_in_safari",
                "ollama_generate",
                "ollama_list_models",
                "mongodb_create_database",
                "mongodb_list_databases",
                "mongodb_create_collection",
                "mongodb_list_collections",
                "mongodb_delete_collection",
                "mongodb_insert_document",
                "mongodb_find_documents",
                "mongodb_delete_document",
            ]
        );
    }

    #[test]
    fn test_list_tools_matches_registry() {
        let registry = builtin_registry(&mock_collaborators()).unwrap();
        let tools = registry.list_tools();
        let names: HashSet<&str> = tools.iter().map(|t| t.name.as_str()).collect();

        assert_eq!(tools.len(), registry.len());
        assert_eq!(names.len(), tools.len(), "descriptor names must be unique");
        for tool in &tools {
            assert_eq!(tool.input_schema["type"], "object");
            assert!(!tool.description.is_empty());
        }
    }

    #[tokio::test]
    async fn test_every_builtin_tool_routes() {
        let registry = builtin_registry(&mock_collaborators()).unwrap();
        for name in registry.names() {
            let outcome = registry.execute(name, serde_json::json!({})).await;
            assert!(
                !matches!(outcome, Err(ToolError::UnknownTool(_))),
                "{} did not route",
                name
            );
        }
    }

    #[test]
    fn test_ollama_generate_schema_default_model() {
        let registry = builtin_registry(&mock_collaborators()).unwrap();
        let schema = registry.get("ollama_generate").unwrap().input_schema();
        assert_eq!(schema["properties"]["model"]["default"], "llama3.2");
        assert_eq!(schema["required"], serde_json::json!(["prompt"]));
    }
}
