//! Server configuration
//!
//! Defaults, then an optional TOML file, then environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const OLLAMA_API_URL_ENV: &str = "OLLAMA_API_URL";
pub const MONGODB_URI_ENV: &str = "MONGODB_URI";

/// Runtime configuration for the tool adapters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the Ollama HTTP API
    pub ollama_api_url: String,
    /// MongoDB connection string
    pub mongodb_uri: String,
    /// Timeout applied by the process executor to each spawned command
    pub command_timeout_secs: u64,
    /// Default tracing filter when RUST_LOG is not set
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_api_url: "http://localhost:11434".to_string(),
            mongodb_uri: "mongodb://localhost:27017".to_string(),
            command_timeout_secs: 30,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load config from an optional file, then apply process environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a TOML config file. Missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Override fields from environment variables. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty(OLLAMA_API_URL_ENV) {
            self.ollama_api_url = url;
        }
        if let Some(uri) = non_empty(MONGODB_URI_ENV) {
            self.mongodb_uri = uri;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.ollama_api_url, "http://localhost:11434");
        assert_eq!(config.mongodb_uri, "mongodb://localhost:27017");
        assert_eq!(config.command_timeout_secs, 30);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (OLLAMA_API_URL_ENV, "http://gpu-box:11434"),
            (MONGODB_URI_ENV, "mongodb://db:27017"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.ollama_api_url, "http://gpu-box:11434");
        assert_eq!(config.mongodb_uri, "mongodb://db:27017");
    }

    #[test]
    fn test_empty_env_ignored() {
        let mut config = Config::default();
        config.apply_env(|_| Some("  ".to_string()));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mongodb_uri = \"mongodb://10.0.0.5:27017\"").unwrap();
        writeln!(file, "command_timeout_secs = 5").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.mongodb_uri, "mongodb://10.0.0.5:27017");
        assert_eq!(config.command_timeout_secs, 5);
        assert_eq!(config.ollama_api_url, "http://localhost:11434");
    }

    #[test]
    fn test_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "command_timeout_secs = \"soon\"").unwrap();
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file(Path::new("/nonexistent/mac-apps.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
