//! Configuration loading from dbchat.toml.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bridge::{ProcessConfig, ServiceConfig};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Chat model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Tool service settings.
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Chat model provider configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// API base URL, without the `/v1` suffix.
    pub base_url: String,

    /// Model to use.
    pub model: String,

    /// API key. Usually supplied through `DEEPSEEK_API_KEY` instead.
    pub api_key: Option<String>,

    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: runtime::providers::DEFAULT_BASE_URL.to_string(),
            model: runtime::providers::DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Tool service configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Local port the service listens on.
    pub port: u16,

    /// SQLite database the service opens.
    pub database: PathBuf,

    /// Service executable. Defaults to `dbchat-tools` next to `dbchat`.
    pub command: Option<PathBuf>,

    pub startup_timeout_secs: u64,

    /// Use a service that is already running instead of spawning one.
    pub attach: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            database: PathBuf::from("dbchat.db"),
            command: None,
            startup_timeout_secs: bridge::DEFAULT_STARTUP_TIMEOUT.as_secs(),
            attach: false,
        }
    }
}

impl ToolsConfig {
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Override settings from environment variables.
    ///
    /// `lookup` maps a variable name to its value, normally `std::env::var`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(runtime::providers::API_KEY_ENV) {
            self.model.api_key = Some(key);
        }
        if let Some(url) = lookup("DEEPSEEK_API_BASE_URL") {
            self.model.base_url = url;
        }
        if let Some(model) = lookup("DEEPSEEK_MODEL") {
            self.model.model = model;
        }
        if let Some(port) = lookup("MCP_SERVER_PORT") {
            self.tools.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "MCP_SERVER_PORT",
                value: port,
            })?;
        }
        if let Some(database) = lookup("DBCHAT_DATABASE") {
            self.tools.database = PathBuf::from(database);
        }
        Ok(())
    }

    /// Bridge settings for the tool service.
    ///
    /// `default_command` is used when `tools.command` is not set.
    pub fn service_config(&self, default_command: &Path) -> ServiceConfig {
        let tools = &self.tools;
        let config = if tools.attach {
            ServiceConfig::attach(tools.base_url())
        } else {
            let command = tools.command.as_deref().unwrap_or(default_command);
            let process = ProcessConfig::new(command.to_string_lossy())
                .arg("--port")
                .arg(tools.port.to_string())
                .arg("--database")
                .arg(tools.database.to_string_lossy())
                .arg("--watch-stdin");
            ServiceConfig::spawn(tools.base_url(), process)
        };
        config.startup_timeout(Duration::from_secs(tools.startup_timeout_secs))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}
