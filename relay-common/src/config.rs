//! Configuration management for the relay.
//!
//! The relay reads an optional JSON file at `~/.line-relay/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! ## Secrets (all three are required)
//! - `LINE_CHANNEL_SECRET` → secrets.line_channel_secret
//! - `LINE_CHANNEL_ACCESS_TOKEN` → secrets.line_channel_access_token
//! - `OPENAI_API_KEY` → secrets.openai_api_key
//!
//! ## Server
//! - `PORT` → network.port
//! - `RELAY_BIND_ADDRESS` → network.bind
//!
//! ## Tunables
//! - `RELAY_MAX_TURNS` → session.max_turns
//! - `RELAY_MAX_INPUT_LENGTH` → session.max_input_length
//! - `RELAY_MODEL` → llm.model
//! - `RELAY_LOG_LEVEL` / `RELAY_LOG_FORMAT` → observability.*

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".line-relay"),
        |dirs| dirs.home_dir().join(".line-relay"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Network Configuration
// ============================================================================

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address. Default: "0.0.0.0" (the webhook must be reachable).
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Listen port. Default: 5000
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    5000
}

// ============================================================================
// Secrets Configuration
// ============================================================================

/// Credentials for the two external services.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecretsConfig {
    /// LINE channel secret (webhook signature key)
    #[serde(default)]
    pub line_channel_secret: Option<String>,

    /// LINE channel access token (reply API bearer token)
    #[serde(default)]
    pub line_channel_access_token: Option<String>,

    /// OpenAI API key
    #[serde(default)]
    pub openai_api_key: Option<String>,
}

// ============================================================================
// Session Configuration
// ============================================================================

/// Conversation memory limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Conversation turns kept per user (one turn = user + assistant message)
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Maximum characters accepted in one user message
    #[serde(default = "default_max_input_length")]
    pub max_input_length: usize,

    /// Evict sessions idle for longer than this. `None` keeps sessions for
    /// the lifetime of the process.
    #[serde(default)]
    pub idle_ttl_secs: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_input_length: default_max_input_length(),
            idle_ttl_secs: None,
        }
    }
}

fn default_max_turns() -> usize {
    10
}

fn default_max_input_length() -> usize {
    500
}

// ============================================================================
// LLM Configuration
// ============================================================================

/// Completion provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Chat model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API base URL (override for compatible endpoints)
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            base_url: default_llm_base_url(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_llm_model() -> String {
    "gpt-4o-mini".into()
}

fn default_llm_base_url() -> String {
    "https://api.openai.com".into()
}

fn default_llm_timeout() -> u64 {
    60
}

// ============================================================================
// LINE Configuration
// ============================================================================

/// LINE Messaging API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineConfig {
    /// Messaging API base URL
    #[serde(default = "default_line_api_base")]
    pub api_base_url: String,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_line_api_base(),
        }
    }
}

fn default_line_api_base() -> String {
    "https://api.line.me".into()
}

// ============================================================================
// Relay / Observability
// ============================================================================

/// Conversation behavior.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RelayConfig {
    /// Replacement persona for the system instruction. Read once at startup.
    #[serde(default)]
    pub persona: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub secrets: SecretsConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub line: LineConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path. A missing file yields the
    /// defaults.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration and apply environment overrides.
    ///
    /// Secrets are not checked here; call [`Config::validate`] once logging
    /// is up so the failure is reported.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup("LINE_CHANNEL_SECRET") {
            self.secrets.line_channel_secret = Some(secret);
        }
        if let Some(token) = lookup("LINE_CHANNEL_ACCESS_TOKEN") {
            self.secrets.line_channel_access_token = Some(token);
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.secrets.openai_api_key = Some(key);
        }

        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.network.port = port;
        }
        if let Some(bind) = lookup("RELAY_BIND_ADDRESS") {
            self.network.bind = bind;
        }

        if let Some(turns) = lookup("RELAY_MAX_TURNS").and_then(|v| v.parse().ok()) {
            self.session.max_turns = turns;
        }
        if let Some(len) = lookup("RELAY_MAX_INPUT_LENGTH").and_then(|v| v.parse().ok()) {
            self.session.max_input_length = len;
        }
        if let Some(model) = lookup("RELAY_MODEL") {
            self.llm.model = model;
        }

        if let Some(level) = lookup("RELAY_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("RELAY_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }

    /// Check that every required secret is present and non-empty.
    pub fn validate(&self) -> std::result::Result<(), Error> {
        let required = [
            ("LINE_CHANNEL_SECRET", &self.secrets.line_channel_secret),
            (
                "LINE_CHANNEL_ACCESS_TOKEN",
                &self.secrets.line_channel_access_token,
            ),
            ("OPENAI_API_KEY", &self.secrets.openai_api_key),
        ];

        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.as_deref().map_or(true, str::is_empty))
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing required secrets: {}",
                missing.join(", ")
            )));
        }

        if self.session.max_turns == 0 {
            return Err(Error::Config("session.max_turns must be at least 1".into()));
        }

        Ok(())
    }

    /// Get the listen address as `host:port`.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.network.bind, self.network.port)
    }

    /// Channel secret. Empty when unset; call [`Config::validate`] first.
    pub fn line_channel_secret(&self) -> &str {
        self.secrets.line_channel_secret.as_deref().unwrap_or_default()
    }

    /// Channel access token. Empty when unset.
    pub fn line_channel_access_token(&self) -> &str {
        self.secrets
            .line_channel_access_token
            .as_deref()
            .unwrap_or_default()
    }

    /// OpenAI API key. Empty when unset.
    pub fn openai_api_key(&self) -> &str {
        self.secrets.openai_api_key.as_deref().unwrap_or_default()
    }
}
