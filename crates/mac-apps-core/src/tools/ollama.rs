//! Ollama tools: text generation and model listing over the local HTTP API

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{ToolHandler, json_schema, optional_str, required_str};
use crate::error::{ToolError, ToolResult};

pub const DEFAULT_MODEL: &str = "llama3.2";

const GENERATE_TIMEOUT: Duration = Duration::from_secs(30);
const LIST_TIMEOUT: Duration = Duration::from_secs(10);
const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

/// Model entry from `/api/tags`
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaModel {
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

/// Thin client for the Ollama HTTP API
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build Ollama HTTP client")?;
        Ok(Self::with_http_client(base_url, client))
    }

    /// Use a preconfigured reqwest client
    pub fn with_http_client(base_url: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Run a non-streaming completion and return the model's text
    pub async fn generate(&self, model: &str, prompt: &str) -> ToolResult<String> {
        let endpoint = format!("{}/api/generate", self.base_url);
        debug!("Ollama generate with model {}", model);

        let response = self
            .client
            .post(&endpoint)
            .timeout(GENERATE_TIMEOUT)
            .json(&GenerateRequest {
                model,
                prompt,
                stream: false,
            })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.map_request_error(e, "Ollama error"))?;

        let payload: GenerateResponse = response
            .json()
            .await
            .map_err(|e| self.map_request_error(e, "Ollama error"))?;

        Ok(payload
            .response
            .unwrap_or_else(|| "No response from model".to_string()))
    }

    /// List locally available models
    pub async fn list_models(&self) -> ToolResult<Vec<OllamaModel>> {
        let endpoint = format!("{}/api/tags", self.base_url);
        const CONTEXT: &str = "Error getting list of models";

        let response = self
            .client
            .get(&endpoint)
            .timeout(LIST_TIMEOUT)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.map_request_error(e, CONTEXT))?;

        let payload: TagsResponse = response
            .json()
            .await
            .map_err(|e| self.map_request_error(e, CONTEXT))?;
        Ok(payload.models)
    }

    fn map_request_error(&self, error: reqwest::Error, context: &str) -> ToolError {
        if error.is_connect() {
            return ToolError::Connectivity(format!(
                "Failed to connect to Ollama server ({}). Make sure Ollama is running: ollama serve",
                self.base_url
            ));
        }
        ToolError::Collaborator(format!("{}: {}", context, error))
    }
}

/// Generate text with a local model
pub struct OllamaGenerateTool {
    client: Arc<OllamaClient>,
}

impl OllamaGenerateTool {
    pub fn new(client: Arc<OllamaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for OllamaGenerateTool {
    fn name(&self) -> &str {
        "ollama_generate"
    }

    fn description(&self) -> &str {
        "Generates response using local Ollama model. Use for tasks requiring AI text processing"
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "model": {
                    "type": "string",
                    "description": "Ollama model name (e.g., 'llama3.2', 'deepseek-r1:8b'). Default 'llama3.2'",
                    "default": DEFAULT_MODEL
                },
                "prompt": {
                    "type": "string",
                    "description": "Prompt for the model"
                }
            }),
            vec!["prompt"],
        )
    }

    async fn execute(&self, input: Value) -> ToolResult<String> {
        let prompt = required_str(&input, "prompt")?;
        let model = optional_str(&input, "model").unwrap_or(DEFAULT_MODEL);
        self.client.generate(model, prompt).await
    }
}

/// List models available to Ollama
pub struct OllamaListModelsTool {
    client: Arc<OllamaClient>,
}

impl OllamaListModelsTool {
    pub fn new(client: Arc<OllamaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for OllamaListModelsTool {
    fn name(&self) -> &str {
        "ollama_list_models"
    }

    fn description(&self) -> &str {
        "Gets list of available Ollama models"
    }

    fn input_schema(&self) -> Value {
        json_schema(serde_json::json!({}), vec![])
    }

    async fn execute(&self, _input: Value) -> ToolResult<String> {
        let models = self.client.list_models().await?;
        if models.is_empty() {
            return Ok("No available models. Load a model: ollama pull llama3.2".to_string());
        }

        let lines: Vec<String> = models
            .iter()
            .map(|m| format!("- {} ({:.2} GB)", m.name, m.size as f64 / BYTES_PER_GB))
            .collect();
        Ok(format!("Available Ollama models:\n{}", lines.join("\n")))
    }
}
