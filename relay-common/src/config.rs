//! Configuration management for the Relay chat backend.
//!
//! Configuration is read from an optional JSON file at `~/.relay/config.json`
//! (or the path in `RELAY_CONFIG`) and then overridden from the environment.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `OPENROUTER_API_KEY` → llm.api_key
//! - `RELAY_MODEL` → llm.model
//! - `RELAY_TEMPERATURE` → llm.temperature
//! - `RELAY_LLM_BASE_URL` → llm.base_url
//! - `RELAY_BIND_ADDRESS` → server.bind
//! - `RELAY_PORT` → server.port
//! - `RELAY_ALLOWED_ORIGINS` → server.allowed_origins (comma separated)
//! - `RELAY_STORAGE` → storage.backend
//! - `RELAY_DATABASE_URL` → storage.url
//! - `RELAY_PERSONA_NAME` → context.persona_name
//! - `RELAY_RESUME_PATH` → context.resume_paths (checked first)
//! - `RELAY_PORTFOLIO_PATH` → context.portfolio_path
//! - `RELAY_LOG_LEVEL` / `RELAY_LOG_FORMAT` → observability.*

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::validation::{ValidationError, ValidationResult};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".relay"),
        |dirs| dirs.home_dir().join(".relay"),
    )
}

/// Get the configuration file path.
///
/// `RELAY_CONFIG` takes precedence over the default location.
pub fn config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_dir().join("config.json"))
}

// ============================================================================
// Server
// ============================================================================

/// HTTP listener and CORS settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address. Default: "127.0.0.1"
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Listen port. Default: 8000
    #[serde(default = "default_port")]
    pub port: u16,

    /// Frontend origins allowed to call the API cross-origin
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

// ============================================================================
// LLM
// ============================================================================

/// Completion API settings.
///
/// Model and temperature are fixed for the lifetime of the process; clients
/// cannot choose them per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenRouter API key (required)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model identifier in `provider/model` form
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Optional completion length cap
    #[serde(default)]
    pub max_tokens: Option<i64>,

    /// OpenAI-compatible API root
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Sent as `HTTP-Referer` for OpenRouter app attribution
    #[serde(default)]
    pub app_url: Option<String>,

    /// Sent as `X-Title` for OpenRouter app attribution
    #[serde(default)]
    pub app_title: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            base_url: default_llm_base_url(),
            app_url: None,
            app_title: None,
        }
    }
}

// ============================================================================
// Storage
// ============================================================================

/// Session storage backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local map, lost on restart
    #[default]
    Memory,
    /// SQLite file, one row per session
    Sqlite,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "in-memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!("unknown storage backend '{other}'")),
        }
    }
}

/// Session storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Connection string, required for the sqlite backend
    /// (`sqlite://path/to/sessions.db`, a bare path, or `:memory:`)
    #[serde(default)]
    pub url: Option<String>,
}

// ============================================================================
// Context
// ============================================================================

/// Sources for the identity/context prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Name the assistant speaks as, in first person
    #[serde(default = "default_persona_name")]
    pub persona_name: String,

    /// Candidate resume locations; the first existing one wins
    #[serde(default = "default_resume_paths")]
    pub resume_paths: Vec<PathBuf>,

    /// Plain-text portfolio details
    #[serde(default = "default_portfolio_path_opt")]
    pub portfolio_path: Option<PathBuf>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            persona_name: default_persona_name(),
            resume_paths: default_resume_paths(),
            portfolio_path: Some(default_portfolio_path()),
        }
    }
}

// ============================================================================
// Observability
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to hold at `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path, or defaults if absent.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::debug!("Config file not found at {}, using defaults", path.display());
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

    /// Load configuration with environment variable overrides.
    ///
    /// An override that cannot be parsed fails the load.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> ValidationResult<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Every parsable override is applied; unparsable ones are reported
    /// together and leave their field untouched.
    pub fn apply_overrides_from<F>(&mut self, var: F) -> ValidationResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut errors = Vec::new();

        if let Some(key) = var("OPENROUTER_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = var("RELAY_MODEL") {
            self.llm.model = model;
        }
        if let Some(temperature) = var("RELAY_TEMPERATURE") {
            match temperature.trim().parse() {
                Ok(t) => self.llm.temperature = t,
                Err(_) => errors.push(invalid_override(
                    "RELAY_TEMPERATURE",
                    &temperature,
                    "expected a number",
                )),
            }
        }
        if let Some(url) = var("RELAY_LLM_BASE_URL") {
            self.llm.base_url = url;
        }

        if let Some(bind) = var("RELAY_BIND_ADDRESS") {
            self.server.bind = bind;
        }
        if let Some(port) = var("RELAY_PORT") {
            match port.trim().parse() {
                Ok(p) => self.server.port = p,
                Err(_) => errors.push(invalid_override(
                    "RELAY_PORT",
                    &port,
                    "expected a port number",
                )),
            }
        }
        if let Some(origins) = var("RELAY_ALLOWED_ORIGINS") {
            self.server.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(backend) = var("RELAY_STORAGE") {
            match backend.parse() {
                Ok(b) => self.storage.backend = b,
                Err(e) => errors.push(invalid_override("RELAY_STORAGE", &backend, &e)),
            }
        }
        if let Some(url) = var("RELAY_DATABASE_URL") {
            self.storage.url = Some(url);
        }

        if let Some(name) = var("RELAY_PERSONA_NAME") {
            self.context.persona_name = name;
        }
        if let Some(path) = var("RELAY_RESUME_PATH") {
            self.context.resume_paths.insert(0, PathBuf::from(path));
        }
        if let Some(path) = var("RELAY_PORTFOLIO_PATH") {
            self.context.portfolio_path = Some(PathBuf::from(path));
        }

        if let Some(level) = var("RELAY_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = var("RELAY_LOG_FORMAT") {
            self.observability.log_format = format;
        }

        ValidationError::collect(errors)
    }

    /// Address the HTTP server listens on, as `host:port`.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.bind, self.server.port)
    }
}

fn invalid_override(var: &str, value: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: var.to_string(),
        reason: format!("'{value}': {reason}"),
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8000
}
fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".into(),
        "http://localhost:5174".into(),
        "http://localhost:3000".into(),
    ]
}
fn default_model() -> String {
    "google/gemma-3-4b-it:free".into()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_persona_name() -> String {
    "the portfolio owner".into()
}
fn default_resume_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("resume.pdf"), PathBuf::from("../public/resume.pdf")]
}
fn default_portfolio_path() -> PathBuf {
    PathBuf::from("portfolio.txt")
}
fn default_portfolio_path_opt() -> Option<PathBuf> {
    Some(default_portfolio_path())
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
