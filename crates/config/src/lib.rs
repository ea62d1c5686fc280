//! Configuration loading, validation, and management for Patchloop.
//!
//! Loads configuration from `~/.patchloop/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.patchloop/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model used for the main conversation
    #[serde(default = "default_model")]
    pub model: String,

    /// Model used to generate search/replace edits
    #[serde(default = "default_model")]
    pub editor_model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Context window size, used for the "% of context" usage report
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: u64,

    /// Extra text appended to the built-in system instruction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_extra: Option<String>,

    /// Turn loop and automode settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// Diff engine settings
    #[serde(default)]
    pub editor: EditorSettings,

    /// Isolated execution environment settings
    #[serde(default)]
    pub execution: ExecutionSettings,

    /// Cost estimation
    #[serde(default)]
    pub pricing: PricingSettings,
}

fn default_model() -> String {
    "gemini-1.5-pro-latest".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_output_tokens() -> u32 {
    8192
}
fn default_max_context_tokens() -> u64 {
    1_000_000
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
            .field("model", &self.model)
            .field("editor_model", &self.editor_model)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("max_context_tokens", &self.max_context_tokens)
            .field("system_prompt_extra", &self.system_prompt_extra)
            .field("agent", &self.agent)
            .field("editor", &self.editor)
            .field("execution", &self.execution)
            .field("pricing", &self.pricing)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Iteration cap when `automode` is entered without a number
    #[serde(default = "default_max_automode_iterations")]
    pub max_automode_iterations: u32,

    /// Sentinel the model emits when an automode goal is reached
    #[serde(default = "default_completion_phrase")]
    pub completion_phrase: String,

    /// Delay before re-issuing a rate-limited request
    #[serde(default = "default_rate_limit_backoff_secs")]
    pub rate_limit_backoff_secs: u64,

    /// How many times a rate-limited request is re-issued before giving up
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,
}

fn default_max_automode_iterations() -> u32 {
    25
}
fn default_completion_phrase() -> String {
    "AUTOMODE_COMPLETE".into()
}
fn default_rate_limit_backoff_secs() -> u64 {
    5
}
fn default_max_rate_limit_retries() -> u32 {
    3
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_automode_iterations: default_max_automode_iterations(),
            completion_phrase: default_completion_phrase(),
            rate_limit_backoff_secs: default_rate_limit_backoff_secs(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorSettings {
    /// Generation rounds per `edit_and_apply` call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// How many past edit summaries the editor keeps as context
    #[serde(default = "default_memory_limit")]
    pub memory_limit: usize,
}

fn default_max_retries() -> u32 {
    3
}
fn default_memory_limit() -> usize {
    10
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            memory_limit: default_memory_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// Directory holding the prepared execution environment.
    /// Defaults to `~/.patchloop/env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_dir: Option<PathBuf>,

    /// Interpreter used to run submitted code
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Soft timeout for the synchronous wait on a spawned process
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_interpreter() -> String {
    "python3".into()
}
fn default_timeout_secs() -> u64 {
    10
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            env_dir: None,
            interpreter: default_interpreter(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingSettings {
    /// USD per 1M input tokens
    #[serde(default = "default_input_per_m")]
    pub input_per_m: f64,

    /// USD per 1M output tokens
    #[serde(default = "default_output_per_m")]
    pub output_per_m: f64,
}

fn default_input_per_m() -> f64 {
    3.0
}
fn default_output_per_m() -> f64 {
    15.0
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            input_per_m: default_input_per_m(),
            output_per_m: default_output_per_m(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location with env overrides.
    ///
    /// Priority: env vars > config file > defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("PATCHLOOP_API_KEY")
                .ok()
                .or_else(|| std::env::var("GEMINI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("PATCHLOOP_MODEL") {
            config.model = model;
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
        dirs_home().join(".patchloop")
    }

    /// Directory of the prepared execution environment.
    pub fn env_dir(&self) -> PathBuf {
        self.execution
            .env_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("env"))
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.editor.max_retries == 0 {
            return Err(ConfigError::ValidationError(
                "editor.max_retries must be at least 1".into(),
            ));
        }

        if self.agent.completion_phrase.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "agent.completion_phrase must not be empty".into(),
            ));
        }

        if self.max_context_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "max_context_tokens must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            editor_model: default_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            max_context_tokens: default_max_context_tokens(),
            system_prompt_extra: None,
            agent: AgentSettings::default(),
            editor: EditorSettings::default(),
            execution: ExecutionSettings::default(),
            pricing: PricingSettings::default(),
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
