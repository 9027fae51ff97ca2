//! Configuration loading, validation, and management for Avacyn.
//!
//! Loads configuration from `~/.avacyn/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.avacyn/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Provider API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible inference endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Default sampling temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Model routing
    #[serde(default)]
    pub models: ModelsConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Web search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Turn orchestration configuration
    #[serde(default)]
    pub turn: TurnConfig,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_temperature", &self.default_temperature)
            .field("models", &self.models)
            .field("gateway", &self.gateway)
            .field("storage", &self.storage)
            .field("search", &self.search)
            .field("turn", &self.turn)
            .finish()
    }
}

/// Which model serves which role. Turn requests name one of the chat
/// models; the title, artifact, and suggestion flows have fixed routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Default conversational model
    #[serde(default = "default_chat_model")]
    pub chat: String,

    /// Smaller model used when the client asks for the light tier
    #[serde(default = "default_chat_model_small")]
    pub chat_small: String,

    /// Model used to synthesize chat titles
    #[serde(default = "default_title_model")]
    pub title: String,

    /// Model used for document generation and revision
    #[serde(default = "default_artifact_model")]
    pub artifact: String,
}

fn default_chat_model() -> String {
    "gpt-4o".into()
}
fn default_chat_model_small() -> String {
    "gpt-4o-mini".into()
}
fn default_title_model() -> String {
    "gpt-4o-mini".into()
}
fn default_artifact_model() -> String {
    "gpt-4o".into()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            chat: default_chat_model(),
            chat_small: default_chat_model_small(),
            title: default_title_model(),
            artifact: default_artifact_model(),
        }
    }
}

impl ModelsConfig {
    /// Whether a client-supplied model id maps to a configured model.
    pub fn is_known(&self, requested: &str) -> bool {
        matches!(requested, "chat-model-small" | "chat-model-large")
            || requested == self.chat
            || requested == self.chat_small
    }

    /// Resolve a client-supplied model id to a configured model, falling
    /// back to the default chat model for unknown ids.
    pub fn resolve_chat(&self, requested: Option<&str>) -> &str {
        match requested {
            Some("chat-model-small") => &self.chat_small,
            Some("chat-model-large") | None => &self.chat,
            Some(other) if other == self.chat_small => &self.chat_small,
            Some(other) if other == self.chat => &self.chat,
            Some(other) => {
                tracing::debug!(requested = other, "unknown model id, using default");
                &self.chat
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Whether unauthenticated requests are rejected (disable only in tests)
    #[serde(default = "default_true")]
    pub require_auth: bool,
}

fn default_port() -> u16 {
    8090
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            require_auth: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file. `:memory:` keeps everything
    /// in-process, for tests.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "~/.avacyn/avacyn.db".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl StorageConfig {
    /// The db_path with a leading `~` expanded to the user's home.
    pub fn resolved_db_path(&self) -> String {
        if let Some(rest) = self.db_path.strip_prefix("~/") {
            return dirs_home().join(rest).to_string_lossy().into_owned();
        }
        self.db_path.clone()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Tavily API key. Search tools degrade to an error payload when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_search_url")]
    pub api_url: String,
}

fn default_search_url() -> String {
    "https://api.tavily.com".into()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_search_url(),
        }
    }
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Ceiling on one turn's wall-clock time, in seconds
    #[serde(default = "default_turn_timeout")]
    pub timeout_secs: u64,

    /// Maximum model round-trips per turn
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
}

fn default_turn_timeout() -> u64 {
    60
}
fn default_max_steps() -> u32 {
    5
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_turn_timeout(),
            max_steps: default_max_steps(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.avacyn/config.toml).
    ///
    /// Also checks environment variables:
    /// - `AVACYN_API_KEY` / `OPENAI_API_KEY` for the provider key
    /// - `AVACYN_API_URL` for the inference endpoint
    /// - `TAVILY_API_KEY` for web search
    /// - `AVACYN_DB_PATH` for the database file
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("AVACYN_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(url) = std::env::var("AVACYN_API_URL") {
            config.api_url = url;
        }

        if config.search.api_key.is_none() {
            config.search.api_key = std::env::var("TAVILY_API_KEY").ok();
        }

        if let Ok(path) = std::env::var("AVACYN_DB_PATH") {
            config.storage.db_path = path;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".avacyn")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.turn.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "turn.timeout_secs must be > 0".into(),
            ));
        }

        if self.turn.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "turn.max_steps must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if a provider API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `init` output).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            default_temperature: default_temperature(),
            models: ModelsConfig::default(),
            gateway: GatewayConfig::default(),
            storage: StorageConfig::default(),
            search: SearchConfig::default(),
            turn: TurnConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
