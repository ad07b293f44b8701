//! Configuration management
//!
//! This module handles loading, validation, and management of the Ross configuration.
//! Configuration is stored in TOML format at ~/.ross/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **llm**: Text-generation provider settings and call timeout
//! - **search**: Web-search provider settings and call timeout
//! - **server**: HTTP bind address and allowed CORS origins
//! - **run**: Per-run tuning (event buffer size)
//!
//! API keys are never stored here. They are resolved through
//! [`crate::secrets::SecretManager`] from the environment or the OS keychain.
//!
//! # Examples
//!
//! ```no_run
//! use ross_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Data dir: {:?}", config.core.data_dir);
//! println!("Default provider: {}", config.llm.default_provider);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// LLM provider configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Search provider configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Run tuning
    #[serde(default)]
    pub run: RunConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Default LLM provider (openai, ollama)
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Timeout applied to every text-generation call, in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// OpenAI provider settings
    #[serde(default)]
    pub openai: OpenAIConfig,

    /// Ollama provider settings
    #[serde(default)]
    pub ollama: OllamaConfig,
}

/// OpenAI provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// Base URL for OpenAI-compatible API
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default)]
    pub temperature: f32,
    // Note: API key comes from OPENAI_API_KEY or the keychain, not from config
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL for Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

/// Search provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Search provider (tavily)
    #[serde(default = "default_search_provider")]
    pub provider: String,

    /// Timeout applied to every search call, in seconds
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,

    /// Tavily provider settings
    #[serde(default)]
    pub tavily: TavilyConfig,
}

/// Tavily search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TavilyConfig {
    /// Base URL for the Tavily API
    #[serde(default = "default_tavily_base_url")]
    pub base_url: String,

    /// Maximum results per query
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Search depth (basic, advanced)
    #[serde(default = "default_search_depth")]
    pub search_depth: String,
    // Note: API key comes from TAVILY_API_KEY or the keychain, not from config
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins; "*" allows any origin
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

/// Run tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Capacity of the per-run progress event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.ross")
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_search_provider() -> String {
    "tavily".to_string()
}

fn default_search_timeout() -> u64 {
    30
}

fn default_tavily_base_url() -> String {
    "https://api.tavily.com".to_string()
}

fn default_max_results() -> u32 {
    5
}

fn default_search_depth() -> String {
    "basic".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_event_buffer() -> usize {
    64
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            timeout_secs: default_llm_timeout(),
            openai: OpenAIConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            temperature: 0.0,
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            timeout_secs: default_search_timeout(),
            tavily: TavilyConfig::default(),
        }
    }
}

impl Default for TavilyConfig {
    fn default() -> Self {
        Self {
            base_url: default_tavily_base_url(),
            max_results: default_max_results(),
            search_depth: default_search_depth(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            event_buffer: default_event_buffer(),
        }
    }
}

impl LLMConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from the default location (~/.ross/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let default_config = Self::default_config();

        // Persist the unexpanded form so the file stays portable
        let toml_string = toml::to_string_pretty(&default_config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = default_config;
        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.ross/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".ross").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig::default(),
            llm: LLMConfig::default(),
            search: SearchConfig::default(),
            server: ServerConfig::default(),
            run: RunConfig::default(),
        }
    }

    /// Path of the SQLite session database inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("sessions.db")
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates enumerated fields and numeric ranges
    /// - Expands ~ in the data directory
    /// - Creates the data directory if it doesn't exist
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_providers = ["openai", "ollama"];
        if !valid_providers.contains(&self.llm.default_provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid default provider '{}'. Must be one of: {}",
                self.llm.default_provider,
                valid_providers.join(", ")
            )));
        }

        let valid_search_providers = ["tavily"];
        if !valid_search_providers.contains(&self.search.provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid search provider '{}'. Must be one of: {}",
                self.search.provider,
                valid_search_providers.join(", ")
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(EngineError::Config(
                "llm.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.search.timeout_secs == 0 {
            return Err(EngineError::Config(
                "search.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.search.tavily.max_results == 0 {
            return Err(EngineError::Config(
                "search.tavily.max_results must be greater than 0".to_string(),
            ));
        }
        if self.run.event_buffer == 0 {
            return Err(EngineError::Config(
                "run.event_buffer must be greater than 0".to_string(),
            ));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        self.core.data_dir = self.core.data_dir.canonicalize().map_err(|e| {
            EngineError::PathCanonicalization(self.core.data_dir.clone(), e.to_string())
        })?;

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
