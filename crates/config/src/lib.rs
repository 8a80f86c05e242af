//! Configuration management for agentry
//!
//! Loads agent defaults, transport retry policy and credentials from
//! `~/.agentry/config.json`, with environment variables layered on top.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod paths;

pub use paths::{config_path, data_dir, env_file_path};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config not found: {0}")]
    NotFound(PathBuf),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Credentials for one OpenAI-compatible endpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

impl ProviderConfig {
    pub fn api_key(&self) -> Option<String> {
        if self.api_key.is_empty() {
            None
        } else {
            Some(self.api_key.clone())
        }
    }
}

/// All known endpoints
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: ProviderConfig,
    #[serde(default)]
    pub groq: ProviderConfig,
    #[serde(default)]
    pub openrouter: ProviderConfig,
    #[serde(default)]
    pub ollama: ProviderConfig,
}

/// Defaults applied to every agent built by the host
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentDefaults {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_retries: default_max_retries(),
            max_tool_rounds: default_max_tool_rounds(),
            tool_timeout_secs: default_tool_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_model() -> String {
    "groq:llama-3.3-70b-versatile".to_string()
}

fn default_max_retries() -> u32 {
    2
}

fn default_max_tool_rounds() -> u32 {
    20
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

/// Automatic retry of transient model-client failures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransportConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_backoff_coefficient")]
    pub backoff_coefficient: f64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_coefficient: default_backoff_coefficient(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

fn default_backoff_coefficient() -> f64 {
    2.0
}

/// Keys for the demo agents' HTTP tools
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ToolsConfig {
    #[serde(default)]
    pub weather_api_key: String,
    #[serde(default)]
    pub geo_api_key: String,
}

impl ToolsConfig {
    pub fn weather_api_key(&self) -> Option<String> {
        (!self.weather_api_key.is_empty()).then(|| self.weather_api_key.clone())
    }

    pub fn geo_api_key(&self) -> Option<String> {
        (!self.geo_api_key.is_empty()).then(|| self.geo_api_key.clone())
    }
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub agent: AgentDefaults,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Config {
    /// Load from the default location
    pub async fn load() -> Result<Self> {
        let path = config_path();
        Self::load_from(&path).await
    }

    /// Load from a specific location; a missing file yields defaults
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }

        debug!(path = %path.display(), "loading config");
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to the default location
    pub async fn save(&self) -> Result<()> {
        let path = config_path();
        self.save_to(&path).await
    }

    /// Save to a specific location
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!(path = %path.display(), "saving config");

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Reject values the agent runtime cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.agent.model.trim().is_empty() {
            return Err(ConfigError::Invalid("agent.model is empty".to_string()));
        }
        if self.agent.max_tool_rounds == 0 {
            return Err(ConfigError::Invalid(
                "agent.max_tool_rounds must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.agent.temperature) {
            return Err(ConfigError::Invalid(format!(
                "agent.temperature {} is outside 0.0..=2.0",
                self.agent.temperature
            )));
        }
        if self.transport.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "transport.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.transport.backoff_coefficient < 1.0 {
            return Err(ConfigError::Invalid(
                "transport.backoff_coefficient must be >= 1.0".to_string(),
            ));
        }
        if self.transport.initial_backoff_ms > self.transport.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "transport.initial_backoff_ms exceeds transport.max_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Overlay values from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Overlay values from an arbitrary lookup; empty values are ignored
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(model) = get("AGENTRY_MODEL") {
            self.agent.model = model;
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.providers.openai.api_key = key;
        }
        if let Some(key) = get("GROQ_API_KEY") {
            self.providers.groq.api_key = key;
        }
        if let Some(key) = get("OPENROUTER_API_KEY") {
            self.providers.openrouter.api_key = key;
        }
        if let Some(base) = get("OLLAMA_BASE_URL") {
            self.providers.ollama.api_base = Some(base);
        }
        if let Some(key) = get("WEATHER_API_KEY") {
            self.tools.weather_api_key = key;
        }
        if let Some(key) = get("GEO_API_KEY") {
            self.tools.geo_api_key = key;
        }
    }

    /// Credentials for a provider by name (`openai`, `groq`, `openrouter`, `ollama`)
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        match name {
            "openai" => Some(&self.providers.openai),
            "groq" => Some(&self.providers.groq),
            "openrouter" => Some(&self.providers.openrouter),
            "ollama" => Some(&self.providers.ollama),
            _ => None,
        }
    }

    /// Names of providers with a key configured
    pub fn configured_providers(&self) -> Vec<&'static str> {
        ["openai", "groq", "openrouter", "ollama"]
            .into_iter()
            .filter(|name| {
                self.provider(name)
                    .map(|p| !p.api_key.is_empty())
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn default_model(&self) -> String {
        self.agent.model.clone()
    }
}

/// Write a default config if none exists and return the effective one
pub async fn init() -> Result<Config> {
    let path = config_path();
    init_at(&path).await
}

pub async fn init_at(path: &Path) -> Result<Config> {
    if path.exists() {
        warn!(path = %path.display(), "config already exists, leaving it untouched");
    } else {
        Config::default().save_to(path).await?;
        info!(path = %path.display(), "wrote default config");
    }

    Config::load_from(path).await
}
