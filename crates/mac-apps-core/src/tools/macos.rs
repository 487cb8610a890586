//! macOS automation tools using `open` and AppleScript

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{ToolHandler, json_schema, required_str};
use crate::error::{ToolError, ToolResult};

const RUNNING_APPS_SCRIPT: &str = r#"tell application "System Events" to get name of every application process whose background only is false"#;

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A command counts as failed when it exits non-zero or writes to stderr
    pub fn failed(&self) -> bool {
        !self.success || !self.stderr.trim().is_empty()
    }

    /// Human-readable reason for a failure
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            "command exited with a non-zero status".to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Runs an external program once and captures its output
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> ToolResult<CommandOutput>;
}

/// Spawns real processes via tokio
pub struct SystemCommandRunner {
    timeout: Duration,
}

impl SystemCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> ToolResult<CommandOutput> {
        debug!("Running {} {:?}", program, args);

        let output = tokio::time::timeout(
            self.timeout,
            Command::new(program).args(args).kill_on_drop(true).output(),
        )
        .await
        .map_err(|_| {
            ToolError::Collaborator(format!(
                "Command execution timed out after {} seconds",
                self.timeout.as_secs()
            ))
        })?
        .map_err(|e| ToolError::Collaborator(format!("Failed to execute {}: {}", program, e)))?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Escape a value for use inside an AppleScript string literal
pub(crate) fn escape_applescript(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(['\n', '\r'], " ")
        .chars()
        .filter(|&c| c >= ' ' || c == '\t')
        .collect()
}

/// Wrap a script body in a `tell application` block
fn tell_block(app_name: &str, body: &str) -> String {
    format!(
        "tell application \"{}\"\n{}\nend tell",
        escape_applescript(app_name),
        body
    )
}

async fn osascript(runner: &dyn CommandRunner, script: String) -> ToolResult<CommandOutput> {
    runner.run("osascript", &["-e".to_string(), script]).await
}

/// Launch an application by name
pub struct OpenApplicationTool {
    runner: Arc<dyn CommandRunner>,
}

impl OpenApplicationTool {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ToolHandler for OpenApplicationTool {
    fn name(&self) -> &str {
        "open_application"
    }

    fn description(&self) -> &str {
        "Opens an application on Mac by name. Examples: 'Safari', 'Finder', 'TextEdit', 'Calculator'"
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "appName": {
                    "type": "string",
                    "description": "Application name to launch (e.g., 'Safari', 'Calculator')"
                }
            }),
            vec!["appName"],
        )
    }

    async fn execute(&self, input: Value) -> ToolResult<String> {
        let app_name = required_str(&input, "appName")?;
        debug!("Launching application: {}", app_name);

        let output = self
            .runner
            .run("open", &["-a".to_string(), app_name.to_string()])
            .await?;

        if output.failed() {
            return Err(ToolError::Collaborator(format!(
                "Failed to launch application \"{}\": {}",
                app_name,
                output.error_text()
            )));
        }
        Ok(format!("Application \"{}\" successfully launched", app_name))
    }
}

/// List foreground applications via System Events
pub struct GetRunningApplicationsTool {
    runner: Arc<dyn CommandRunner>,
}

impl GetRunningApplicationsTool {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ToolHandler for GetRunningApplicationsTool {
    fn name(&self) -> &str {
        "get_running_applications"
    }

    fn description(&self) -> &str {
        "Gets list of all running applications on Mac"
    }

    fn input_schema(&self) -> Value {
        json_schema(serde_json::json!({}), vec![])
    }

    async fn execute(&self, _input: Value) -> ToolResult<String> {
        let output = osascript(self.runner.as_ref(), RUNNING_APPS_SCRIPT.to_string()).await?;

        if output.failed() {
            return Err(ToolError::Collaborator(format!(
                "Failed to get list of applications: {}",
                output.error_text()
            )));
        }

        let apps: Vec<&str> = output
            .stdout
            .trim()
            .split(", ")
            .map(str::trim)
            .filter(|app| !app.is_empty())
            .collect();
        Ok(format!("Running applications:\n{}", apps.join("\n")))
    }
}

/// Run an arbitrary AppleScript body inside `tell application`
pub struct RunAppleScriptTool {
    runner: Arc<dyn CommandRunner>,
}

impl RunAppleScriptTool {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ToolHandler for RunAppleScriptTool {
    fn name(&self) -> &str {
        "run_applescript"
    }

    fn description(&self) -> &str {
        "Executes AppleScript command in specified application. Useful for automating actions in applications"
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "appName": {
                    "type": "string",
                    "description": "Application name (e.g., 'Safari', 'Finder')"
                },
                "script": {
                    "type": "string",
                    "description": "AppleScript command to execute"
                }
            }),
            vec!["appName", "script"],
        )
    }

    async fn execute(&self, input: Value) -> ToolResult<String> {
        let app_name = required_str(&input, "appName")?;
        let script = required_str(&input, "script")?;
        debug!("Running AppleScript in {}", app_name);

        let output = osascript(self.runner.as_ref(), tell_block(app_name, script)).await?;

        // The script's own error output is the answer, not a tool failure
        let stdout = output.stdout.trim_end();
        let stderr = output.stderr.trim_end();
        if !stdout.is_empty() {
            Ok(stdout.to_string())
        } else if !stderr.is_empty() {
            warn!("AppleScript in {} reported: {}", app_name, stderr);
            Ok(stderr.to_string())
        } else {
            Ok("Command executed successfully".to_string())
        }
    }
}

/// Quit an application via AppleScript
pub struct QuitApplicationTool {
    runner: Arc<dyn CommandRunner>,
}

impl QuitApplicationTool {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ToolHandler for QuitApplicationTool {
    fn name(&self) -> &str {
        "quit_application"
    }

    fn description(&self) -> &str {
        "Closes specified application"
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "appName": {
                    "type": "string",
                    "description": "Application name to close"
                }
            }),
            vec!["appName"],
        )
    }

    async fn execute(&self, input: Value) -> ToolResult<String> {
        let app_name = required_str(&input, "appName")?;
        debug!("Quitting application: {}", app_name);

        let output = osascript(self.runner.as_ref(), tell_block(app_name, "quit")).await?;

        if output.failed() {
            return Err(ToolError::Collaborator(format!(
                "Failed to close application \"{}\": {}",
                app_name,
                output.error_text()
            )));
        }
        Ok(format!("Application \"{}\" closed", app_name))
    }
}

/// Open a file or URL with a specific application
pub struct OpenFileWithAppTool {
    runner: Arc<dyn CommandRunner>,
}

impl OpenFileWithAppTool {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ToolHandler for OpenFileWithAppTool {
    fn name(&self) -> &str {
        "open_file_with_app"
    }

    fn description(&self) -> &str {
        "Opens file or URL in specified application"
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "path": {
                    "type": "string",
                    "description": "Path to file or URL"
                },
                "appName": {
                    "type": "string",
                    "description": "Application name to open file with"
                }
            }),
            vec!["path", "appName"],
        )
    }

    async fn execute(&self, input: Value) -> ToolResult<String> {
        let path = required_str(&input, "path")?;
        let app_name = required_str(&input, "appName")?;
        debug!("Opening {} with {}", path, app_name);

        let output = self
            .runner
            .run(
                "open",
                &["-a".to_string(), app_name.to_string(), path.to_string()],
            )
            .await?;

        if output.failed() {
            return Err(ToolError::Collaborator(format!(
                "Failed to open file: {}",
                output.error_text()
            )));
        }
        Ok(format!(
            "File \"{}\" opened in application \"{}\"",
            path, app_name
        ))
    }
}

/// Open a Google search in Safari
pub struct SearchGoogleInSafariTool {
    runner: Arc<dyn CommandRunner>,
}

impl SearchGoogleInSafariTool {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ToolHandler for SearchGoogleInSafariTool {
    fn name(&self) -> &str {
        "search_google_in_safari"
    }

    fn description(&self) -> &str {
        "Performs Google search through Safari browser"
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "query": {
                    "type": "string",
                    "description": "Search query for Google"
                }
            }),
            vec!["query"],
        )
    }

    async fn execute(&self, input: Value) -> ToolResult<String> {
        let query = input
            .get("query")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if query.trim().is_empty() {
            return Err(ToolError::Argument(
                "Search query cannot be empty".to_string(),
            ));
        }

        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        let google_url = format!("https://www.google.com/search?q={}", encoded);
        debug!("Opening Safari search: {}", google_url);

        let output = self
            .runner
            .run("open", &["-a".to_string(), "Safari".to_string(), google_url])
            .await?;

        if output.failed() {
            return Err(ToolError::Collaborator(format!(
                "Failed to open search in Safari: {}",
                output.error_text()
            )));
        }
        Ok(format!("Search \"{}\" opened in Safari", query))
    }
}
