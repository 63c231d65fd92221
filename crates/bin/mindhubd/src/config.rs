//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `mindhub.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// RPC server settings.
    pub server: ServerConfig,
    /// Database settings.
    pub database: DatabaseConfig,
    /// Automation source directory settings.
    pub automations: AutomationsConfig,
    /// Language-model backend settings.
    pub llm: LlmConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// WebSocket listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Automation directory configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AutomationsConfig {
    /// Directory holding automation markdown files. When unset the
    /// pipeline stays dormant and the daemon serves RPC only.
    pub dir: Option<PathBuf>,
    /// Coalescing window for filesystem change bursts, in seconds.
    pub debounce_seconds: u64,
}

/// Language-model backend configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: `anthropic`, `openai` or `ollama`.
    pub provider: String,
    /// API key, required for hosted providers.
    pub api_key: Option<String>,
    /// Model name passed through to the provider.
    pub model: String,
    /// Override of the provider's base URL.
    pub base_url: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from `mindhub.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("mindhub.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MINDHUB_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("MINDHUB_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = std::env::var("MINDHUB_DATABASE_URL") {
            self.database.url = val;
        }
        if let Ok(val) = std::env::var("MINDHUB_AUTOMATION_DIR") {
            self.automations.dir = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("MINDHUB_LLM_PROVIDER") {
            self.llm.provider = val;
        }
        if let Ok(val) = std::env::var("MINDHUB_LLM_API_KEY") {
            self.llm.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("MINDHUB_LLM_MODEL") {
            self.llm.model = val;
        }
        if let Ok(val) = std::env::var("MINDHUB_LLM_BASE_URL") {
            self.llm.base_url = Some(val);
        }
        if let Ok(val) = std::env::var("MINDHUB_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        if self.llm.model.is_empty() {
            return Err(ConfigError::Validation(
                "llm.model must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Return the debounce window as a [`Duration`].
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.automations.debounce_seconds)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:mindhub.db?mode=rwc".to_string(),
        }
    }
}

impl Default for AutomationsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            debounce_seconds: 2,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            api_key: None,
            model: "llama3.2".to_string(),
            base_url: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "mindhubd=info,mindhub=info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
