//! Configuration loading and validation for IronLoom.
//!
//! Loads configuration from `~/.ironloom/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ironloom/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model provider connection
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Defaults for a single agent run
    #[serde(default)]
    pub agent: AgentSettings,

    /// Concurrency ceilings and timeouts for the orchestration manager
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Built-in tool limits
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Custom model pricing overrides (model name -> pricing)
    #[serde(default)]
    pub pricing: HashMap<String, PricingOverrideConfig>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("provider", &self.provider)
            .field("agent", &self.agent)
            .field("orchestrator", &self.orchestrator)
            .field("tools", &self.tools)
            .field("pricing", &self.pricing)
            .finish()
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Sent as `HTTP-Referer`
    #[serde(default = "default_referer")]
    pub referer: String,

    /// Sent as `X-Title`
    #[serde(default = "default_title")]
    pub title: String,

    /// Timeout for non-streaming requests
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_referer() -> String {
    "https://github.com/Nitin-100/ironloom".into()
}
fn default_title() -> String {
    "IronLoom".into()
}
fn default_request_timeout() -> u64 {
    30
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            referer: default_referer(),
            title: default_title(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("referer", &self.referer)
            .field("title", &self.title)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_model")]
    pub model: String,

    /// Turn cap for top-level runs
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Output token limit; 0 means "derive from the model"
    #[serde(default)]
    pub max_tokens: u32,

    /// Working directory for tools (defaults to the current directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<String>,

    /// When non-empty, file tools are confined to these directories
    #[serde(default)]
    pub sandbox_paths: Vec<String>,
}

fn default_model() -> String {
    "anthropic/claude-sonnet-4-6".into()
}
fn default_max_turns() -> u32 {
    300
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_turns: default_max_turns(),
            max_tokens: 0,
            work_dir: None,
            sandbox_paths: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Model used by builder runs
    #[serde(default = "default_model")]
    pub builder_model: String,

    #[serde(default = "default_five")]
    pub max_concurrent_agents: usize,

    #[serde(default = "default_agent_timeout")]
    pub agent_timeout_minutes: u64,

    /// Tasks accepted by a single delegation call
    #[serde(default = "default_five")]
    pub max_subagent_tasks: usize,

    /// Sub-agents running at once, across all delegations
    #[serde(default = "default_five")]
    pub max_concurrent_subagents: usize,

    #[serde(default = "default_subagent_turns")]
    pub subagent_max_turns: u32,

    #[serde(default = "default_subagent_timeout")]
    pub subagent_timeout_minutes: u64,
}

fn default_five() -> usize {
    5
}
fn default_agent_timeout() -> u64 {
    60
}
fn default_subagent_turns() -> u32 {
    10
}
fn default_subagent_timeout() -> u64 {
    10
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            builder_model: default_model(),
            max_concurrent_agents: default_five(),
            agent_timeout_minutes: default_agent_timeout(),
            max_subagent_tasks: default_five(),
            max_concurrent_subagents: default_five(),
            subagent_max_turns: default_subagent_turns(),
            subagent_timeout_minutes: default_subagent_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_bash_timeout")]
    pub bash_timeout_secs: u64,

    #[serde(default = "default_bash_max_timeout")]
    pub bash_max_timeout_secs: u64,

    #[serde(default = "default_bash_max_output")]
    pub bash_max_output_bytes: usize,

    #[serde(default = "default_request_timeout")]
    pub web_fetch_timeout_secs: u64,
}

fn default_bash_timeout() -> u64 {
    120
}
fn default_bash_max_timeout() -> u64 {
    600
}
fn default_bash_max_output() -> usize {
    30 * 1024
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            bash_timeout_secs: default_bash_timeout(),
            bash_max_timeout_secs: default_bash_max_timeout(),
            bash_max_output_bytes: default_bash_max_output(),
            web_fetch_timeout_secs: default_request_timeout(),
        }
    }
}

/// Custom per-million-token pricing for a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingOverrideConfig {
    /// Price per 1M input tokens in USD
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD
    pub output_per_m: f64,
}

impl AppConfig {
    /// Load configuration from the default path (~/.ironloom/config.toml).
    ///
    /// Environment overrides:
    /// - `IRONLOOM_API_KEY`, then `OPENROUTER_API_KEY` (when no key is configured)
    /// - `IRONLOOM_MODEL`
    /// - `IRONLOOM_BASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.provider.api_key.is_none() {
            self.provider.api_key = lookup("IRONLOOM_API_KEY")
                .or_else(|| lookup("OPENROUTER_API_KEY"))
                .filter(|k| !k.is_empty());
        }

        if let Some(model) = lookup("IRONLOOM_MODEL") {
            self.agent.model = model;
        }

        if let Some(url) = lookup("IRONLOOM_BASE_URL") {
            self.provider.base_url = url;
        }
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
        dirs_home().join(".ironloom")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_turns must be > 0".into(),
            ));
        }

        let o = &self.orchestrator;
        if o.max_concurrent_agents == 0
            || o.max_subagent_tasks == 0
            || o.max_concurrent_subagents == 0
        {
            return Err(ConfigError::ValidationError(
                "orchestrator concurrency limits must be > 0".into(),
            ));
        }

        if o.subagent_max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.subagent_max_turns must be > 0".into(),
            ));
        }

        if self.tools.bash_timeout_secs > self.tools.bash_max_timeout_secs {
            return Err(ConfigError::ValidationError(
                "tools.bash_timeout_secs must not exceed tools.bash_max_timeout_secs".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            agent: AgentSettings::default(),
            orchestrator: OrchestratorConfig::default(),
            tools: ToolsConfig::default(),
            pricing: HashMap::new(),
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
