//! Configuration system for the NLQ server
//!
//! Loads configuration from:
//! 1. config.yaml - operational settings (port, limits, logging)
//! 2. .env file - secrets (API keys)
//!
//! Environment variables always override config.yaml values.

use nlq_guard::{GuardPolicy, RowCapStyle};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Reporting database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// DuckDB file path, or ":memory:"
    pub path: String,

    /// Create missing reporting tables on startup
    pub bootstrap_schema: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "./reporting.duckdb".to_string(),
            bootstrap_schema: false,
        }
    }
}

/// Query pipeline limits and switches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Rows buffered and returned per query
    pub max_result_rows: usize,
    pub query_timeout_seconds: u64,
    pub enable_query_history: bool,
    /// Include generated SQL in responses
    pub enable_sql_preview: bool,
    pub rate_limit_per_minute: usize,
    pub rate_limit_max_identities: u64,
    pub row_cap_style: RowCapStyle,
    /// Cap injected into statements without a row limit
    pub default_row_cap: usize,
    pub suggestions: Option<Vec<String>>,
    pub policy: GuardPolicy,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_result_rows: 1000,
            query_timeout_seconds: 30,
            enable_query_history: true,
            enable_sql_preview: true,
            rate_limit_per_minute: 10,
            rate_limit_max_identities: 10_000,
            row_cap_style: RowCapStyle::default(),
            default_row_cap: 1000,
            suggestions: None,
            policy: GuardPolicy::default(),
        }
    }
}

impl QueryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_seconds)
    }
}

/// Draft model endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,

    /// OpenAI-compatible base URL; the provider default when unset
    pub api_base: Option<String>,

    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            api_base: None,
            temperature: 0.0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stdout, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            output: "stdout".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub query: QueryConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file means defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            return Self::load(path);
        }
        tracing::debug!(path = %path.as_ref().display(), "No config file, using defaults");
        let mut config = Config::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from `var`; unparsable numbers are ignored.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(host) = var("NLQ_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("NLQ_SERVER_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }

        if let Some(path) = var("NLQ_DATABASE_PATH") {
            self.database.path = path;
        }

        if let Some(rows) = var("NLQ_MAX_RESULT_ROWS").and_then(|v| v.parse().ok()) {
            self.query.max_result_rows = rows;
        }
        if let Some(secs) = var("NLQ_QUERY_TIMEOUT_SECONDS").and_then(|v| v.parse().ok()) {
            self.query.query_timeout_seconds = secs;
        }
        if let Some(limit) = var("NLQ_RATE_LIMIT_PER_MINUTE").and_then(|v| v.parse().ok()) {
            self.query.rate_limit_per_minute = limit;
        }

        if let Some(model) = var("NLQ_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(base) = var("NLQ_LLM_API_BASE") {
            self.llm.api_base = Some(base);
        }

        if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Some(format) = var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(output) = var("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Some(dir) = var("LOG_DIR") {
            self.logging.directory = dir;
        }
    }

    /// Draft model API key from environment (must be in .env)
    pub fn llm_api_key() -> Result<String, ConfigError> {
        std::env::var("NLQ_LLM_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .map_err(|_| ConfigError::MissingEnvVar("NLQ_LLM_API_KEY".to_string()))
    }

    /// Set logging environment variables for the logging module
    pub fn apply_logging_env(&self) {
        std::env::set_var("RUST_LOG", &self.logging.level);
        std::env::set_var("LOG_FORMAT", &self.logging.format);
        std::env::set_var("LOG_OUTPUT", &self.logging.output);
        std::env::set_var("LOG_DIR", &self.logging.directory);
    }
}
